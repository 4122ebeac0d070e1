//! Key validation.
//!
//! Every check runs before a mutation touches the keyspace, so a rejected key
//! never leaves partial state behind.

use crate::config::Config;
use crate::error::{Error, Result};

pub(crate) fn validate_key(config: &Config, key: &[u8]) -> Result<()> {
    if key.len() > config.max_key_len {
        return Err(Error::KeyTooLong {
            len: key.len(),
            max: config.max_key_len,
        });
    }
    if config.reject_control_bytes {
        if let Some(offset) = key.iter().position(|b| b.is_ascii_control()) {
            return Err(Error::NonPrintableKey {
                byte: key[offset],
                offset,
            });
        }
    }
    if config.reject_malformed_structured && !structure_balanced(key) {
        return Err(Error::MalformedStructuredKey);
    }
    Ok(())
}

/// A key opening with `{` or `[` must close every bracket it opens, in order.
/// Brackets inside double-quoted strings do not count. Other keys pass.
fn structure_balanced(key: &[u8]) -> bool {
    if !matches!(key.first().copied(), Some(b'{' | b'[')) {
        return true;
    }

    let mut open: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for &b in key {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => open.push(b'}'),
            b'[' => open.push(b']'),
            b'}' | b']' => {
                if open.pop() != Some(b) {
                    return false;
                }
            }
            _ => {}
        }
    }
    !in_string && open.is_empty()
}
