//! The `function@hexarg@hexarg…` call-data wire format.
//!
//! Cross-shard calls and builtin-function invocations travel as text: the
//! function name followed by `@`-separated lowercase-hex arguments. The
//! builder and parser here are exact inverses for well-formed data.

use thiserror::Error;

/// Separator between the function name and each argument.
pub const ARG_SEPARATOR: u8 = b'@';

/// Errors produced while parsing call data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxDataError {
    /// The data is empty or starts with a separator.
    #[error("missing function name")]
    MissingFunction,
    /// An argument is not valid lowercase hex.
    #[error("invalid hex argument at index {0}")]
    InvalidHexArgument(usize),
}

/// Incremental builder for call data.
#[derive(Debug, Default)]
pub struct TxDataBuilder {
    parts: Vec<Vec<u8>>,
}

impl TxDataBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        TxDataBuilder::default()
    }

    /// Sets the leading function name. Should be called first.
    pub fn func(mut self, name: &str) -> Self {
        self.parts.insert(0, name.as_bytes().to_vec());
        self
    }

    /// Appends one raw argument, hex-encoded on output.
    pub fn arg(mut self, bytes: &[u8]) -> Self {
        self.parts.push(hex::encode(bytes).into_bytes());
        self
    }

    /// Appends a big-endian u64 argument with leading zeros stripped.
    pub fn arg_u64(self, value: u64) -> Self {
        let bytes = value.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        self.arg(&bytes[first..])
    }

    /// Serializes the accumulated parts.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push(ARG_SEPARATOR);
            }
            out.extend_from_slice(part);
        }
        out
    }
}

/// Parser for the call-data wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallArgsParser;

impl CallArgsParser {
    /// Creates a parser.
    pub fn new() -> Self {
        CallArgsParser
    }

    /// Splits call data into the function name and decoded arguments.
    pub fn parse_data(&self, data: &[u8]) -> Result<(String, Vec<Vec<u8>>), TxDataError> {
        let mut tokens = data.split(|b| *b == ARG_SEPARATOR);
        let func = tokens.next().filter(|f| !f.is_empty()).ok_or(TxDataError::MissingFunction)?;
        let function = String::from_utf8_lossy(func).into_owned();

        let mut arguments = Vec::new();
        for (i, token) in tokens.enumerate() {
            let decoded = hex::decode(token).map_err(|_| TxDataError::InvalidHexArgument(i))?;
            arguments.push(decoded);
        }
        Ok((function, arguments))
    }
}

/// Builds length-prefixed binary data: each part is written as a 4-byte
/// little-endian length followed by the payload. Used for the async
/// correlation prefix on cross-shard transfers, where arguments may be
/// arbitrary bytes and must round-trip without hex expansion.
#[derive(Debug, Default)]
pub struct LengthPrefixedBuilder {
    out: Vec<u8>,
}

impl LengthPrefixedBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        LengthPrefixedBuilder::default()
    }

    /// Appends one part.
    pub fn push(mut self, bytes: &[u8]) -> Self {
        self.out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.out.extend_from_slice(bytes);
        self
    }

    /// Serializes the accumulated parts.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.out.clone()
    }

    /// Splits length-prefixed data back into its parts.
    pub fn split(data: &[u8]) -> Option<Vec<Vec<u8>>> {
        let mut parts = Vec::new();
        let mut cursor = 0usize;
        while cursor < data.len() {
            let len_end = cursor.checked_add(4)?;
            let len_bytes: [u8; 4] = data.get(cursor..len_end)?.try_into().ok()?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            let part_end = len_end.checked_add(len)?;
            parts.push(data.get(len_end..part_end)?.to_vec());
            cursor = part_end;
        }
        Some(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_round_trip() {
        let data = TxDataBuilder::new()
            .func("transferToken")
            .arg(b"WSKN-1a2b3c")
            .arg(&[0x01, 0xFF])
            .to_bytes();
        assert_eq!(
            data,
            format!("transferToken@{}@01ff", hex::encode(b"WSKN-1a2b3c")).into_bytes()
        );

        let (function, args) = CallArgsParser::new().parse_data(&data).unwrap();
        assert_eq!(function, "transferToken");
        assert_eq!(args, vec![b"WSKN-1a2b3c".to_vec(), vec![0x01, 0xFF]]);
    }

    #[test]
    fn test_function_only() {
        let data = TxDataBuilder::new().func("doWork").to_bytes();
        let (function, args) = CallArgsParser::new().parse_data(&data).unwrap();
        assert_eq!(function, "doWork");
        assert!(args.is_empty());
    }

    #[test]
    fn test_empty_argument() {
        let data = b"doWork@".to_vec();
        let (_, args) = CallArgsParser::new().parse_data(&data).unwrap();
        assert_eq!(args, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_parse_errors() {
        let parser = CallArgsParser::new();
        assert_eq!(
            parser.parse_data(b"").unwrap_err(),
            TxDataError::MissingFunction
        );
        assert_eq!(
            parser.parse_data(b"@aa").unwrap_err(),
            TxDataError::MissingFunction
        );
        assert_eq!(
            parser.parse_data(b"f@zz").unwrap_err(),
            TxDataError::InvalidHexArgument(0)
        );
    }

    #[test]
    fn test_arg_u64_strips_leading_zeros() {
        let data = TxDataBuilder::new().func("f").arg_u64(0x01_02).to_bytes();
        assert_eq!(data, b"f@0102".to_vec());
        let data = TxDataBuilder::new().func("f").arg_u64(0).to_bytes();
        assert_eq!(data, b"f@".to_vec());
    }

    #[test]
    fn test_length_prefixed_round_trip() {
        let data = LengthPrefixedBuilder::new()
            .push(b"abc")
            .push(b"")
            .push(&[0xFF; 5])
            .to_bytes();
        let parts = LengthPrefixedBuilder::split(&data).unwrap();
        assert_eq!(parts, vec![b"abc".to_vec(), vec![], vec![0xFF; 5]]);
    }

    #[test]
    fn test_length_prefixed_truncated() {
        let data = LengthPrefixedBuilder::new().push(b"abcdef").to_bytes();
        let truncated = &data[..data.len().saturating_sub(1)];
        assert!(LengthPrefixedBuilder::split(truncated).is_none());
        assert!(LengthPrefixedBuilder::split(&[1, 0, 0]).is_none());
    }
}
