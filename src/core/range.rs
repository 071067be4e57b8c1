// Range descriptors: declarative gt/gte/lt/lte options to a normalized key range.
use std::ops::Bound;

use crate::core::error::Error;
use crate::core::key::Key;

/// Declarative bounds as callers spell them.
///
/// `gt` takes precedence over `gte`, and `lt` over `lte`, when both are set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RangeOptions {
    pub gt: Option<Key>,
    pub gte: Option<Key>,
    pub lt: Option<Key>,
    pub lte: Option<Key>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RangeBound {
    pub key: Key,
    pub exclusive: bool,
}

/// An interval over the key ordering. A missing side is unbounded.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyRange {
    pub lower: Option<RangeBound>,
    pub upper: Option<RangeBound>,
}

impl KeyRange {
    pub fn bound(lower: Key, upper: Key, lower_exclusive: bool, upper_exclusive: bool) -> Self {
        Self {
            lower: Some(RangeBound {
                key: lower,
                exclusive: lower_exclusive,
            }),
            upper: Some(RangeBound {
                key: upper,
                exclusive: upper_exclusive,
            }),
        }
    }

    pub fn lower_bound(key: Key, exclusive: bool) -> Self {
        Self {
            lower: Some(RangeBound { key, exclusive }),
            upper: None,
        }
    }

    pub fn upper_bound(key: Key, exclusive: bool) -> Self {
        Self {
            lower: None,
            upper: Some(RangeBound { key, exclusive }),
        }
    }

    pub fn only(key: Key) -> Self {
        Self::bound(key.clone(), key, false, false)
    }

    pub fn contains(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            Some(bound) if bound.exclusive => key > &bound.key,
            Some(bound) => key >= &bound.key,
            None => true,
        };
        let below_upper = match &self.upper {
            Some(bound) if bound.exclusive => key < &bound.key,
            Some(bound) => key <= &bound.key,
            None => true,
        };
        above_lower && below_upper
    }

    /// True when no key can satisfy both bounds (lower above upper, or equal with an open side).
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => {
                lower.key > upper.key
                    || (lower.key == upper.key && (lower.exclusive || upper.exclusive))
            }
            _ => false,
        }
    }

    pub(crate) fn encode(&self) -> Result<EncodedRange, Error> {
        Ok(EncodedRange {
            lower: encode_bound(self.lower.as_ref())?,
            upper: encode_bound(self.upper.as_ref())?,
        })
    }
}

/// Build the range an ordered scan should cover; `None` means no filtering.
pub fn build_range(options: &RangeOptions) -> Option<KeyRange> {
    let lower = match (&options.gt, &options.gte) {
        (Some(key), _) => Some(RangeBound {
            key: key.clone(),
            exclusive: true,
        }),
        (None, Some(key)) => Some(RangeBound {
            key: key.clone(),
            exclusive: false,
        }),
        (None, None) => None,
    };
    let upper = match (&options.lt, &options.lte) {
        (Some(key), _) => Some(RangeBound {
            key: key.clone(),
            exclusive: true,
        }),
        (None, Some(key)) => Some(RangeBound {
            key: key.clone(),
            exclusive: false,
        }),
        (None, None) => None,
    };
    if lower.is_none() && upper.is_none() {
        return None;
    }
    Some(KeyRange { lower, upper })
}

/// A key range in engine byte form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EncodedRange {
    pub(crate) lower: Bound<Vec<u8>>,
    pub(crate) upper: Bound<Vec<u8>>,
}

impl EncodedRange {
    pub(crate) fn full() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub(crate) fn from_range(range: Option<&KeyRange>) -> Result<Self, Error> {
        match range {
            Some(range) => range.encode(),
            None => Ok(Self::full()),
        }
    }
}

fn encode_bound(bound: Option<&RangeBound>) -> Result<Bound<Vec<u8>>, Error> {
    Ok(match bound {
        Some(bound) if bound.exclusive => Bound::Excluded(bound.key.encode()?),
        Some(bound) => Bound::Included(bound.key.encode()?),
        None => Bound::Unbounded,
    })
}

/// True when no byte string lies between `lower` and `upper`.
pub(crate) fn bounds_are_empty(lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{bounds_are_empty, build_range, KeyRange, RangeOptions};
    use crate::core::key::Key;
    use std::ops::Bound;

    #[test]
    fn no_bounds_means_full_scan() {
        assert_eq!(build_range(&RangeOptions::default()), None);
    }

    #[test]
    fn gt_and_lt_are_exclusive() {
        let options = RangeOptions {
            gt: Some(Key::from("KX")),
            lt: Some(Key::from("KX\u{ff}")),
            ..RangeOptions::default()
        };
        let range = build_range(&options).expect("range");
        assert_eq!(
            range,
            KeyRange::bound(Key::from("KX"), Key::from("KX\u{ff}"), true, true)
        );
    }

    #[test]
    fn gte_and_lte_are_inclusive() {
        let options = RangeOptions {
            gte: Some(Key::from(1)),
            lte: Some(Key::from(9)),
            ..RangeOptions::default()
        };
        let range = build_range(&options).expect("range");
        assert_eq!(range, KeyRange::bound(Key::from(1), Key::from(9), false, false));
        assert!(range.contains(&Key::from(1)));
        assert!(range.contains(&Key::from(9)));
        assert!(!range.contains(&Key::from(10)));
    }

    #[test]
    fn mixed_pairs_build_bounded_ranges() {
        let options = RangeOptions {
            gte: Some(Key::from("a")),
            lt: Some(Key::from("b")),
            ..RangeOptions::default()
        };
        let range = build_range(&options).expect("range");
        assert_eq!(range, KeyRange::bound(Key::from("a"), Key::from("b"), false, true));
    }

    #[test]
    fn single_sided_ranges_use_their_own_inclusivity() {
        let only_gt = RangeOptions {
            gt: Some(Key::from("m")),
            ..RangeOptions::default()
        };
        assert_eq!(
            build_range(&only_gt),
            Some(KeyRange::lower_bound(Key::from("m"), true))
        );

        let only_gte = RangeOptions {
            gte: Some(Key::from("m")),
            ..RangeOptions::default()
        };
        assert_eq!(
            build_range(&only_gte),
            Some(KeyRange::lower_bound(Key::from("m"), false))
        );

        let only_lte = RangeOptions {
            lte: Some(Key::from("m")),
            ..RangeOptions::default()
        };
        assert_eq!(
            build_range(&only_lte),
            Some(KeyRange::upper_bound(Key::from("m"), false))
        );
    }

    #[test]
    fn gt_wins_over_gte() {
        let options = RangeOptions {
            gt: Some(Key::from(5)),
            gte: Some(Key::from(1)),
            ..RangeOptions::default()
        };
        assert_eq!(
            build_range(&options),
            Some(KeyRange::lower_bound(Key::from(5), true))
        );
    }

    #[test]
    fn inverted_ranges_are_empty() {
        assert!(KeyRange::bound(Key::from(5), Key::from(1), false, false).is_empty());
        assert!(KeyRange::bound(Key::from(5), Key::from(5), true, false).is_empty());
        assert!(!KeyRange::only(Key::from(5)).is_empty());
        let a: &[u8] = b"a";
        assert!(bounds_are_empty(Bound::Excluded(a), Bound::Excluded(a)));
        assert!(!bounds_are_empty(Bound::Included(a), Bound::Included(a)));
        assert!(!bounds_are_empty(Bound::Unbounded, Bound::Excluded(a)));
    }
}
