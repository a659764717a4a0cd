use std::io::{self, Read};

use super::{HttpHeaders, HttpReaderError, Proto};

/// Reads one line from `reader`, decoding bytes as ISO-8859-1.
///
/// A lone `\n` ends the line. A `\r` directly before that `\n` is dropped;
/// any other `\r` is kept as part of the line. Returns `Ok(None)` when the
/// stream is already at EOF, otherwise whatever was read up to the newline or EOF.
///
/// # Errors
/// Propagates read errors other than `Interrupted`.
pub fn read_line<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    let mut saw_any = false;
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                saw_any = true;
                if byte[0] == b'\n' {
                    break;
                }
                line.push(char::from(byte[0]));
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    if !saw_any {
        return Ok(None);
    }

    if line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Reads header lines into `headers` until an empty line or EOF.
///
/// The name is everything before the first `:` and the value is the trimmed
/// remainder. A line with no `:` is kept, trimmed, under an empty name.
///
/// # Errors
/// Propagates read errors from `reader`.
pub fn read_headers<R: Read + ?Sized>(
    reader: &mut R,
    headers: &mut HttpHeaders,
) -> io::Result<()> {
    while let Some(line) = read_line(reader)? {
        if line.is_empty() {
            break;
        }
        match line.find(':') {
            Some(index) => headers.add(&line[..index], line[index + 1..].trim()),
            None => headers.add("", line.trim()),
        }
    }
    Ok(())
}

/// Parsed response status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub proto: Proto,
    pub code: u16,
    pub message: Option<String>,
}

/// Parses `HTTP/x.y CODE message`.
///
/// Returns `Ok(None)` for lines that do not start with `HTTP/` or carry no
/// space, which callers treat as an unknown status. Any version whose minor
/// digit is not `1` reads as [`Proto::HTTP10`].
///
/// # Errors
/// [`HttpReaderError::InvalidStatusLine`] when the code is not numeric.
pub fn parse_status_line(line: &str) -> Result<Option<StatusLine>, HttpReaderError> {
    if !line.starts_with("HTTP/") {
        return Ok(None);
    }

    let line = line.trim();
    let Some(space) = line.find(' ') else {
        return Ok(None);
    };

    let proto = if line[..space].ends_with('1') {
        Proto::HTTP11
    } else {
        Proto::HTTP10
    };

    let rest = &line[space + 1..];
    let code_end = rest
        .char_indices()
        .nth(3)
        .map_or(rest.len(), |(index, _)| index);

    let code = rest[..code_end]
        .parse::<u16>()
        .map_err(|_| HttpReaderError::InvalidStatusLine(line.to_string()))?;

    let message = rest
        .get(code_end..)
        .and_then(|tail| tail.get(1..))
        .map(str::to_string);

    tracing::debug!("Parsed status line: {proto} {code} {message:?}");
    Ok(Some(StatusLine {
        proto,
        code,
        message,
    }))
}
