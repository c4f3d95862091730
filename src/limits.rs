use {
    crate::decode::{Decode, Decoder, ParseError},
    std::fmt,
};

/// The size range of a table or a memory.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    /// Returns `true` if these [`Limits`] are well formed and within `limit`.
    pub fn is_valid(self, limit: u32) -> bool {
        if self.min > limit {
            return false;
        }
        match self.max {
            Some(max) => self.min <= max && max <= limit,
            None => true,
        }
    }

    /// Returns `true` if every size allowed by these [`Limits`] is allowed by `other`.
    ///
    /// This is the import matching rule: a provided table or memory can satisfy a requirement
    /// if it is at least as large and at most as growable.
    pub fn is_subset_of(self, other: Limits) -> bool {
        if self.min < other.min {
            return false;
        }
        match (self.max, other.max) {
            (_, None) => true,
            (Some(max), Some(other_max)) => max <= other_max,
            (None, Some(_)) => false,
        }
    }
}

impl Decode for Limits {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        match decoder.read_byte()? {
            0x00 => Ok(Self {
                min: decoder.read_size()?,
                max: None,
            }),
            0x01 => Ok(Self {
                min: decoder.read_size()?,
                max: Some(decoder.read_size()?),
            }),
            _ => Err(ParseError::InvalidTag),
        }
    }
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{} {}", self.min, max),
            None => write!(f, "{}", self.min),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_requires_larger_min_and_smaller_max() {
        let required = Limits {
            min: 1,
            max: Some(4),
        };
        assert!(Limits { min: 2, max: Some(3) }.is_subset_of(required));
        assert!(Limits { min: 1, max: Some(4) }.is_subset_of(required));
        assert!(!Limits { min: 0, max: Some(3) }.is_subset_of(required));
        assert!(!Limits { min: 2, max: None }.is_subset_of(required));
        assert!(Limits { min: 2, max: None }.is_subset_of(Limits { min: 1, max: None }));
    }
}
