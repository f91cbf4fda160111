//! Balanced brace block extraction from script text

use crate::error::SigfetchError;

/// Extract one brace-delimited block from `script`.
///
/// `start` must point just past an opening `{` that the caller already
/// consumed. Scanning begins at depth 1 and stops at the matching `}`.
/// The returned text runs from `start` through that closing brace and has a
/// `;` appended so it can be concatenated as a statement.
pub fn extract_block(script: &str, start: usize) -> Result<String, SigfetchError> {
    let bytes = script.as_bytes();
    if start > bytes.len() || !script.is_char_boundary(start) {
        return Err(SigfetchError::UnbalancedBraces(start));
    }

    let mut depth = 1usize;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    let mut block = String::with_capacity(end - start + 1);
                    block.push_str(&script[start..end]);
                    block.push(';');
                    return Ok(block);
                }
            }
            _ => {}
        }
    }

    Err(SigfetchError::UnbalancedBraces(start))
}
