//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// One line of an SMTP reply, `250-text` or `250 text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    pub code: u16,
    /// `false` when the line continues with a `-` separator.
    pub last: bool,
    pub text: &'a str,
}

impl<'a> ReplyLine<'a> {
    /// Parses a single reply line, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` when the line does not start with a
    /// three digit code followed by nothing, a space or a dash.
    pub fn parse(line: &'a str) -> Result<Self> {
        let code = line
            .get(..3)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u16>().ok())
            .ok_or_else(|| ClientError::ParseError(format!("Invalid reply line: '{line}'")))?;

        let (last, text) = match line.as_bytes().get(3) {
            None => (true, ""),
            Some(b' ') => (true, &line[4..]),
            Some(b'-') => (false, &line[4..]),
            Some(_) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator in reply line: '{line}'"
                )));
            }
        };

        Ok(Self { code, last, text })
    }
}

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns `true` for a 2xx reply.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Parses the first complete reply at the start of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` when
    /// the buffer ends before the final line of the reply.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` for a malformed line or a code that
    /// changes between continuation lines, and `ClientError::Utf8Error` for a
    /// line that is not valid UTF-8.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut offset = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(newline) = buffer[offset..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[offset..offset + newline];
            offset += newline + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = ReplyLine::parse(std::str::from_utf8(raw)?)?;
            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                _ => code = Some(line.code),
            }

            lines.push(line.text.to_string());

            if line.last {
                return Ok(Some((Self::new(line.code, lines), offset)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            ReplyLine::parse("220 mail.example.com ESMTP").unwrap(),
            ReplyLine {
                code: 220,
                last: true,
                text: "mail.example.com ESMTP"
            }
        );
        assert_eq!(
            ReplyLine::parse("250-example.com").unwrap(),
            ReplyLine {
                code: 250,
                last: false,
                text: "example.com"
            }
        );
        assert_eq!(
            ReplyLine::parse("250").unwrap(),
            ReplyLine {
                code: 250,
                last: true,
                text: ""
            }
        );
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(ReplyLine::parse("25").is_err());
        assert!(ReplyLine::parse("abc hello").is_err());
        assert!(ReplyLine::parse("+25 ok").is_err());
        assert!(ReplyLine::parse("250+ok").is_err());
    }

    #[test]
    fn test_single_line_reply() {
        let (response, consumed) = Response::parse_response(b"250 example.com\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(response, Response::new(250, vec!["example.com".to_string()]));
        assert_eq!(consumed, 17);
        assert!(response.is_success());
    }

    #[test]
    fn test_multi_line_reply_leaves_trailing_bytes() {
        let data = b"250-example.com\r\n250-PIPELINING\r\n250 8BITMIME\r\n221 Bye\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(response.lines, vec!["example.com", "PIPELINING", "8BITMIME"]);
        assert_eq!(&data[consumed..], b"221 Bye\r\n");
    }

    #[test]
    fn test_bare_lf_terminators() {
        let (response, consumed) = Response::parse_response(b"554-no\n554 go away\n")
            .unwrap()
            .unwrap();
        assert_eq!(response.code, 554);
        assert_eq!(consumed, 19);
        assert!(!response.is_success());
    }

    #[test]
    fn test_incomplete_reply() {
        assert!(Response::parse_response(b"250-example.com\r\n250 PIPE")
            .unwrap()
            .is_none());
        assert!(Response::parse_response(b"").unwrap().is_none());
    }

    #[test]
    fn test_code_mismatch() {
        assert!(matches!(
            Response::parse_response(b"250-one\r\n251 two\r\n"),
            Err(ClientError::ParseError(_))
        ));
    }
}
