//! Discriminant assignment.
//!
//! Tags are resolved in declaration order with one running value: an explicit value is
//! used as-is and becomes the new baseline, an absent one is `previous + 1`. Nothing is
//! sorted and nothing before an override moves.

use std::collections::HashMap;

/// Baseline before the first message, so the first auto-assigned tag is 0.
pub const INITIAL_LAST_VALUE: i64 = -1;

/// Auto-assignment ran past `i64::MAX` at message `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub index: usize,
}

/// Tag for one message given the previously assigned tag.
pub fn next(last_value: i64, explicit: Option<i64>) -> Option<i64> {
    match explicit {
        Some(value) => Some(value),
        None => last_value.checked_add(1),
    }
}

/// Assign tags to a sequence of optional explicit values.
pub fn assign<I>(explicit_values: I) -> Result<Vec<i64>, Overflow>
where
    I: IntoIterator<Item = Option<i64>>,
{
    let mut out = Vec::new();
    explicit_values
        .into_iter()
        .enumerate()
        .try_fold(INITIAL_LAST_VALUE, |last_value, (index, explicit)| {
            let value = next(last_value, explicit).ok_or(Overflow { index })?;
            out.push(value);
            Ok(value)
        })?;
    Ok(out)
}

/// First pair of positions `(earlier, later)` holding the same tag.
pub fn first_collision(values: &[i64]) -> Option<(usize, usize)> {
    let mut seen: HashMap<i64, usize> = HashMap::with_capacity(values.len());
    for (i, v) in values.iter().enumerate() {
        if let Some(&first) = seen.get(v) {
            return Some((first, i));
        }
        seen.insert(*v, i);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_values_count_from_zero() {
        assert_eq!(assign([None, None, None]).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn explicit_value_moves_baseline_forward_only() {
        let tags = assign([None, None, Some(10), None, Some(3), None]).unwrap();
        assert_eq!(tags, vec![0, 1, 10, 11, 3, 4]);
    }

    #[test]
    fn negative_explicit_value() {
        assert_eq!(assign([Some(-5), None]).unwrap(), vec![-5, -4]);
    }

    #[test]
    fn overflow_reports_position() {
        let err = assign([Some(i64::MAX), None]).unwrap_err();
        assert_eq!(err, Overflow { index: 1 });
    }

    #[test]
    fn collisions_found_in_order() {
        assert_eq!(first_collision(&[0, 1, 2]), None);
        assert_eq!(first_collision(&[0, 1, 10, 11, 1, 2]), Some((1, 4)));
    }
}
