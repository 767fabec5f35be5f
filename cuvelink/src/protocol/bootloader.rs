//! STM32 system bootloader codec.
//!
//! The MCU's ROM bootloader speaks the UART protocol from ST application
//! note AN3155: single-byte commands followed by their bitwise complement,
//! big-endian addresses and XOR checksums, with the target answering `ACK`
//! or `NACK` after every step. This module builds the byte sequences; the
//! exchange itself lives in [`crate::flasher`].

/// Positive acknowledge from the bootloader.
pub const ACK: u8 = 0x79;

/// Negative acknowledge from the bootloader.
pub const NACK: u8 = 0x1F;

/// Autobaud discovery byte, the first byte sent after reset into the
/// bootloader.
pub const DISCOVERY: u8 = 0x7F;

/// Extended Erase command with its complement.
pub const CMD_EXTENDED_ERASE: [u8; 2] = [0x44, 0xBB];

/// Extended Erase parameter selecting full-chip mass erase, with its XOR
/// checksum.
pub const MASS_ERASE: [u8; 3] = [0xFF, 0xFF, 0x00];

/// Write Memory command with its complement.
pub const CMD_WRITE_MEMORY: [u8; 2] = [0x31, 0xCE];

/// Go command with its complement.
pub const CMD_GO: [u8; 2] = [0x21, 0xDE];

/// Bytes written per Write Memory transaction.
pub const PAGE_SIZE: usize = 256;

/// Filler for the tail of the last page.
pub const PAGE_FILL: u8 = 0xFF;

/// XOR of all bytes, the bootloader's packet checksum.
pub fn xor8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ *b)
}

/// Address packet: four big-endian address bytes and their XOR.
pub fn address_packet(address: u32) -> [u8; 5] {
    let bytes = address.to_be_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], xor8(&bytes)]
}

/// Data packet for one Write Memory transaction: a length byte holding
/// `PAGE_SIZE - 1`, the page itself, and the XOR of both.
///
/// The caller supplies exactly [`PAGE_SIZE`] bytes; images are padded with
/// [`pad_image`] before being chunked.
pub fn page_packet(page: &[u8]) -> Vec<u8> {
    debug_assert_eq!(page.len(), PAGE_SIZE);
    let mut packet = Vec::with_capacity(PAGE_SIZE + 2);
    #[allow(clippy::cast_possible_truncation)] // PAGE_SIZE - 1 is 255
    packet.push((PAGE_SIZE - 1) as u8);
    packet.extend_from_slice(page);
    packet.push(xor8(&packet));
    packet
}

/// Pad an image up to a whole number of pages with [`PAGE_FILL`].
///
/// An empty image stays empty.
pub fn pad_image(mut image: Vec<u8>) -> Vec<u8> {
    let remainder = image.len() % PAGE_SIZE;
    if remainder != 0 {
        image.resize(image.len() + PAGE_SIZE - remainder, PAGE_FILL);
    }
    image
}
