/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Little-endian integer encoding and blocking socket helpers.
 */
use std::io::{self, Read, Write};
use std::mem;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::RtiError;
use crate::tag::Tag;

pub const TAG_SIZE: usize = mem::size_of::<i64>() + mem::size_of::<u32>();

pub struct NetUtil {}

impl NetUtil {
    /**
     * Fill `buffer` from `stream`, failing if the peer closes the connection
     * before the buffer is full.
     */
    pub fn read_from_socket<R: Read>(
        stream: &mut R,
        buffer: &mut [u8],
        fed_id: u16,
    ) -> Result<(), RtiError> {
        stream.read_exact(buffer).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => RtiError::ConnectionClosed(fed_id),
            _ => RtiError::Network(e),
        })
    }

    pub fn write_to_socket<W: Write>(
        stream: &mut W,
        buffer: &[u8],
        fed_id: u16,
    ) -> Result<(), RtiError> {
        stream.write_all(buffer).map_err(|e| match e.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                RtiError::ConnectionClosed(fed_id)
            }
            _ => RtiError::Network(e),
        })?;
        stream.flush()?;
        Ok(())
    }

    /**
     * Write the specified data as a sequence of bytes starting
     * at the specified index, lowest order byte first.
     */
    pub fn encode_int64(data: i64, buffer: &mut [u8], index: usize) {
        LittleEndian::write_i64(&mut buffer[index..index + mem::size_of::<i64>()], data);
    }

    pub fn encode_int32(data: i32, buffer: &mut [u8], index: usize) {
        LittleEndian::write_i32(&mut buffer[index..index + mem::size_of::<i32>()], data);
    }

    pub fn encode_uint32(data: u32, buffer: &mut [u8], index: usize) {
        LittleEndian::write_u32(&mut buffer[index..index + mem::size_of::<u32>()], data);
    }

    pub fn encode_uint16(data: u16, buffer: &mut [u8], index: usize) {
        LittleEndian::write_u16(&mut buffer[index..index + mem::size_of::<u16>()], data);
    }

    pub fn encode_tag(tag: &Tag, buffer: &mut [u8], index: usize) {
        Self::encode_int64(tag.time(), buffer, index);
        Self::encode_uint32(tag.microstep(), buffer, index + mem::size_of::<i64>());
    }

    pub fn extract_int64(buffer: &[u8]) -> i64 {
        LittleEndian::read_i64(buffer)
    }

    pub fn extract_int32(buffer: &[u8]) -> i32 {
        LittleEndian::read_i32(buffer)
    }

    pub fn extract_uint16(buffer: &[u8]) -> u16 {
        LittleEndian::read_u16(buffer)
    }

    /**
     * Extract the port ID, destination federate ID and payload length at the
     * start of a data message body (the type byte already stripped).
     */
    pub fn extract_header(buffer: &[u8]) -> (u16, u16, i32) {
        let u16_size = mem::size_of::<u16>();
        // The first two bytes are the ID of the destination port.
        let port_id = LittleEndian::read_u16(&buffer[0..u16_size]);
        // The next two bytes are the ID of the destination federate.
        let federate_id = LittleEndian::read_u16(&buffer[u16_size..2 * u16_size]);
        // The next four bytes are the message length.
        let length = LittleEndian::read_i32(&buffer[2 * u16_size..2 * u16_size + 4]);
        (port_id, federate_id, length)
    }

    pub fn extract_timed_header(buffer: &[u8]) -> (u16, u16, i32, Tag) {
        let (port_id, federate_id, length) = Self::extract_header(buffer);
        let start_idx = mem::size_of::<u16>() * 2 + mem::size_of::<i32>();
        let tag = Self::extract_tag(&buffer[start_idx..]);
        (port_id, federate_id, length, tag)
    }

    pub fn extract_tag(buffer: &[u8]) -> Tag {
        let time = LittleEndian::read_i64(&buffer[0..mem::size_of::<i64>()]);
        let microstep = LittleEndian::read_u32(&buffer[mem::size_of::<i64>()..TAG_SIZE]);
        Tag::new(time, microstep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpStream;

    use socket_server_mocker::server_mocker::ServerMocker;
    use socket_server_mocker::server_mocker_instruction::{
        ServerMockerInstruction, ServerMockerInstructionsList,
    };
    use socket_server_mocker::tcp_server_mocker::TcpServerMocker;

    use rand::{Rng, RngCore};

    const MAX_BUFFER_SIZE: usize = 30000;
    const I32_SIZE: usize = mem::size_of::<i32>();
    const LOCAL_HOST: &str = "127.0.0.1";

    fn generate_random_bytes(size: usize) -> Vec<u8> {
        let mut bytes = vec![0 as u8; size];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    #[test]
    fn test_read_from_socket_positive() {
        let port_num = 35640;
        let tcp_server_mocker = TcpServerMocker::new(port_num).unwrap();
        let mut stream = TcpStream::connect(format!("{}:{}", LOCAL_HOST, port_num)).unwrap();
        let mut rng = rand::thread_rng();
        let buffer_size: usize = rng.gen_range(1..MAX_BUFFER_SIZE);
        let msg = generate_random_bytes(buffer_size);
        let _ = tcp_server_mocker.add_mock_instructions_list(
            ServerMockerInstructionsList::new_with_instructions(
                [ServerMockerInstruction::SendMessage(msg.clone())].as_slice(),
            ),
        );
        let mut buffer = vec![0 as u8; buffer_size];
        NetUtil::read_from_socket(&mut stream, &mut buffer, 0).unwrap();
        assert!(buffer == msg);
    }

    #[test]
    fn test_read_from_socket_negative_short_read() {
        let mut input: &[u8] = &[1, 2, 3];
        let mut buffer = vec![0 as u8; 8];
        let result = NetUtil::read_from_socket(&mut input, &mut buffer, 7);
        assert!(matches!(result, Err(RtiError::ConnectionClosed(7))));
    }

    #[test]
    fn test_write_to_socket_positive() {
        let mut output: Vec<u8> = Vec::new();
        let msg = generate_random_bytes(64);
        NetUtil::write_to_socket(&mut output, &msg, 0).unwrap();
        assert!(output == msg);
    }

    #[test]
    fn test_encode_int32_positive() {
        let mut rng = rand::thread_rng();
        let value: i32 = rng.gen_range(0..i32::MAX);
        let idx: usize = rng.gen_range(1..I32_SIZE);
        let mut buffer = vec![0 as u8; idx + I32_SIZE];
        NetUtil::encode_int32(value, &mut buffer, idx);
        assert!(value == i32::from_le_bytes(buffer[idx..].try_into().unwrap()));
    }

    #[test]
    fn test_encode_int64_positive() {
        let mut rng = rand::thread_rng();
        let value: i64 = rng.gen_range(i64::MIN..i64::MAX);
        let mut buffer = vec![0 as u8; 1 + mem::size_of::<i64>()];
        NetUtil::encode_int64(value, &mut buffer, 1);
        assert!(value == NetUtil::extract_int64(&buffer[1..]));
        assert!(buffer[0] == 0);
    }

    #[test]
    fn test_extract_timed_header_positive() {
        let buffer_size = mem::size_of::<u16>() * 2 + mem::size_of::<i32>() + TAG_SIZE;
        let mut buffer = vec![0 as u8; buffer_size];
        let mut rng = rand::thread_rng();
        let port_value: u16 = rng.gen_range(1..u16::MAX);
        let federate_id_value: u16 = rng.gen_range(1..u16::MAX);
        let length_value: i32 = rng.gen_range(1..i32::MAX);
        let tag_value = Tag::new(rng.gen_range(1..i64::MAX), rng.gen_range(1..u32::MAX));
        NetUtil::encode_uint16(port_value, &mut buffer, 0);
        NetUtil::encode_uint16(federate_id_value, &mut buffer, 2);
        NetUtil::encode_int32(length_value, &mut buffer, 4);
        NetUtil::encode_tag(&tag_value, &mut buffer, 8);
        let (port, federate_id, length, tag) = NetUtil::extract_timed_header(&buffer);
        assert!(port == port_value);
        assert!(federate_id == federate_id_value);
        assert!(length == length_value);
        assert!(tag == tag_value);
    }
}
