pub fn cut_start_line(buf: &[u8]) -> (&[u8], &[u8]) {
    let index = buf
        .iter()
        .position(|&byte| byte == b'\n')
        .unwrap_or(buf.len().saturating_sub(1));
    buf.split_at((index + 1).min(buf.len()))
}

pub fn trim_trailing_newline(buf: &[u8]) -> &[u8] {
    if buf.ends_with(b"\r\n") {
        &buf[0..buf.len() - 2]
    } else if buf.ends_with(b"\n") {
        &buf[0..buf.len() - 1]
    } else {
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_start_line() {
        let (line, remain) = cut_start_line(b"HTTP/1.1 200 OK\r\nServer: a\r\n");
        assert_eq!(line, b"HTTP/1.1 200 OK\r\n");
        assert_eq!(remain, b"Server: a\r\n");
    }

    #[test]
    fn test_trim_trailing_newline() {
        assert_eq!(trim_trailing_newline(b"a\r\n"), b"a");
        assert_eq!(trim_trailing_newline(b"a\n"), b"a");
        assert_eq!(trim_trailing_newline(b"a"), b"a");
    }
}
