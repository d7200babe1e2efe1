//! Dotted-integer version comparison for update checks.
use std::cmp::Ordering;

/// Numeric value of one version component. Leading digits count; anything
/// else (`"beta"`, `""`) is zero.
fn component(part: &str) -> u64 {
    let digits: String = part.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Whether `new` should replace `old`.
///
/// A missing new version never updates; a missing old version always does.
/// Components are compared left to right as integers; the first difference
/// decides, and a longer version with an equal prefix is newer.
pub fn is_newer(old: Option<&str>, new: Option<&str>) -> bool {
    let Some(new) = new else { return false };
    let Some(old) = old else { return true };

    let old_parts: Vec<u64> = old.split('.').map(component).collect();
    let new_parts: Vec<u64> = new.split('.').map(component).collect();

    for (o, n) in old_parts.iter().zip(&new_parts) {
        match n.cmp(o) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }
    new_parts.len() > old_parts.len()
}
