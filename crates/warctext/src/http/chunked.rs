//! Chunked transfer coding.

use super::HTTPError;

/// Decodes a complete body held in chunked transfer coding.
///
/// Chunk extensions are ignored and trailer fields are discarded. Returns
/// the concatenated chunk data. A body that ends before the final zero-size
/// chunk returns what was decoded so far together with an
/// [HTTPError::UnexpectedEnd] marker via `Err`.
pub fn decode_chunked(input: &[u8]) -> Result<Vec<u8>, HTTPError> {
    let mut output = Vec::new();
    let mut remain = input;

    loop {
        let (length, rest) = read_chunk_size(remain)?;
        remain = rest;

        if length == 0 {
            // Trailer fields up to the final empty line are discarded.
            return Ok(output);
        }

        if remain.len() < length {
            return Err(HTTPError::UnexpectedEnd);
        }

        output.extend_from_slice(&remain[..length]);
        remain = &remain[length..];
        remain = skip_line_ending(remain)?;
    }
}

fn read_chunk_size(input: &[u8]) -> Result<(usize, &[u8]), HTTPError> {
    let line_end = input
        .iter()
        .position(|&byte| byte == b'\n')
        .ok_or(HTTPError::UnexpectedEnd)?;
    let line = &input[..line_end];
    let line = if line.ends_with(b"\r") {
        &line[..line.len() - 1]
    } else {
        line
    };

    // Anything after ';' is a chunk extension.
    let size_part = line.split(|&byte| byte == b';').next().unwrap_or_default();
    let size_text = std::str::from_utf8(size_part)
        .map_err(|_| HTTPError::MalformedChunkedCoding)?
        .trim();
    let length = usize::from_str_radix(size_text, 16)
        .map_err(|_| HTTPError::MalformedChunkedCoding)?;

    Ok((length, &input[line_end + 1..]))
}

fn skip_line_ending(input: &[u8]) -> Result<&[u8], HTTPError> {
    if let Some(rest) = input.strip_prefix(b"\r\n".as_slice()) {
        Ok(rest)
    } else if let Some(rest) = input.strip_prefix(b"\n".as_slice()) {
        Ok(rest)
    } else if input.is_empty() {
        Err(HTTPError::UnexpectedEnd)
    } else {
        Err(HTTPError::MalformedChunkedCoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chunked() {
        let input = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let output = decode_chunked(input).unwrap();

        assert_eq!(&output, b"hello world");
    }

    #[test]
    fn test_decode_chunked_extension() {
        let input = b"5;name=value\r\nhello\r\n0\r\n\r\n";
        let output = decode_chunked(input).unwrap();

        assert_eq!(&output, b"hello");
    }

    #[test]
    fn test_decode_chunked_truncated() {
        let input = b"5\r\nhel";
        let result = decode_chunked(input);

        assert!(matches!(result, Err(HTTPError::UnexpectedEnd)));
    }

    #[test]
    fn test_decode_chunked_garbage() {
        let input = b"zz\r\nhello\r\n";
        let result = decode_chunked(input);

        assert!(matches!(result, Err(HTTPError::MalformedChunkedCoding)));
    }
}
