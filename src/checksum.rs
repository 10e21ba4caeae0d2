pub(crate) fn xor_update(chk: u8, data: &u8) -> u8 {
    chk ^ *data
}

pub(crate) fn xor_checksum<'a, I>(command: u8, length: u8, payload: I) -> u8
where
    I: IntoIterator<Item = &'a u8>,
{
    let chk = xor_update(command, &length);
    payload.into_iter().fold(chk, xor_update)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_of_empty_response() {
        // WRITE_DATA_RESPONSE_OK with the mandatory zero byte
        assert_eq!(xor_checksum(0x05, 0x03, &[0x00]), 0x06);
    }

    #[test]
    fn test_checksum_cancels_itself() {
        let payload = [0x12, 0x34, 0x56];
        let chk = xor_checksum(0x04, 0x05, &payload);
        assert_eq!(xor_update(chk, &chk), 0);
    }
}
