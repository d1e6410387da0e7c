//! JSON fragment handling for JSON-mode streams.
//!
//! JSON streams store their contents as a comma-terminated concatenation of
//! values. Appending `{"a":1}` stores `{"a":1},`; appending `[1,2]` is
//! flattened to `1,2,`. A read wraps the concatenation in `[` and `]` after
//! trimming the trailing comma, so consumers always receive one JSON array.
//!
//! Flattening only needs bracket/quote state tracking to find the matching
//! `]` of a top-level array. The individual values are not revalidated.

use thiserror::Error;

/// Failures of append-side fragment processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonAppendError {
    #[error("invalid JSON payload: unmatched brackets")]
    Invalid,

    #[error("empty arrays are not allowed on append")]
    EmptyArray,
}

/// Flatten an append payload into a comma-terminated fragment.
///
/// * A top-level array contributes its inner contents (`[1,2]` -> `1,2,`).
/// * Any other payload is stored as a single value with trailing whitespace
///   stripped.
/// * An empty array is an error, except for the initial append during stream
///   creation where it contributes nothing (`Ok(None)`).
pub fn flatten_append(data: &[u8], initial: bool) -> Result<Option<Vec<u8>>, JsonAppendError> {
    let start = match data.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(i) => i,
        None => return Err(JsonAppendError::Invalid),
    };

    let slice = if data[start] == b'[' {
        let close = find_matching_bracket(data, start).ok_or(JsonAppendError::Invalid)?;
        // Only whitespace may follow the closing bracket.
        if data[close + 1..].iter().any(|b| !b.is_ascii_whitespace()) {
            return Err(JsonAppendError::Invalid);
        }
        let inner = trim_ascii(&data[start + 1..close]);
        if inner.is_empty() {
            if initial {
                return Ok(None);
            }
            return Err(JsonAppendError::EmptyArray);
        }
        inner
    } else {
        trim_ascii_end(&data[start..])
    };

    let mut fragment = Vec::with_capacity(slice.len() + 1);
    fragment.extend_from_slice(slice);
    // Normalize any trailing commas the client already supplied.
    while fragment.last() == Some(&b',') {
        fragment.pop();
    }
    if fragment.is_empty() {
        return Err(JsonAppendError::Invalid);
    }
    fragment.push(b',');
    Ok(Some(fragment))
}

/// Wrap comma-terminated fragments into a single JSON array body.
pub fn format_array_body<'a>(fragments: impl Iterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut body = vec![b'['];
    for fragment in fragments {
        body.extend_from_slice(fragment);
    }
    // Strip the trailing comma (and any whitespace around it).
    while body
        .last()
        .is_some_and(|b| *b == b',' || b.is_ascii_whitespace())
    {
        body.pop();
    }
    body.push(b']');
    body
}

/// Find the index of the `]` matching the `[` at `open`, honouring strings
/// and backslash escapes.
fn find_matching_bracket(data: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in data.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn trim_ascii(data: &[u8]) -> &[u8] {
    trim_ascii_end(trim_ascii_start(data))
}

fn trim_ascii_start(mut data: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = data {
        if !first.is_ascii_whitespace() {
            break;
        }
        data = rest;
    }
    data
}

fn trim_ascii_end(mut data: &[u8]) -> &[u8] {
    while let [rest @ .., last] = data {
        if !last.is_ascii_whitespace() {
            break;
        }
        data = rest;
    }
    data
}
