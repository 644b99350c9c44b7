//! 密钥与密文的 Base64 编解码

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Base64 编码
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Base64 解码
pub fn base64_decode(data: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(data.trim())
        .map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// 任意字节序列编码后可原样解码
        #[test]
        fn base64_round_trip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let encoded = base64_encode(&data);
            prop_assert_eq!(base64_decode(&encoded).unwrap(), data);
        }

        #[test]
        fn base64_decode_ignores_surrounding_whitespace(
            data in prop::collection::vec(any::<u8>(), 0..256)
        ) {
            let padded = format!("  {}\n", base64_encode(&data));
            prop_assert_eq!(base64_decode(&padded).unwrap(), data);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(base64_encode(&[]), "");
        assert!(base64_decode("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(base64_decode("not base64!"), Err(Error::Decode(_))));
        assert!(matches!(base64_decode("abc"), Err(Error::Decode(_))));
    }
}
