//! Length-prefixed wire primitives shared by the key codec: big-endian
//! `u32` words and `string` fields as defined by the SSH wire format.

use bytes::{Buf, BufMut};

use super::SshError;

pub(super) fn put_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

pub(super) fn read_u32(buf: &mut &[u8]) -> Result<u32, SshError> {
    if buf.remaining() < 4 {
        return Err(SshError::Truncated);
    }
    Ok(buf.get_u32())
}

pub(super) fn read_string<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], SshError> {
    let n = read_u32(buf)? as usize;
    if buf.len() < n {
        return Err(SshError::Truncated);
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}
