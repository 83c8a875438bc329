//! Tri-state lookup result for "zero, one, or too many" queries.

/// Outcome of a query that expects at most one match.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    NotFound,
    Unique(T),
    /// Every match, in store order. Never narrowed down to one.
    Ambiguous(Vec<T>),
}

impl<T> Lookup<T> {
    pub fn from_vec(mut items: Vec<T>) -> Self {
        match items.len() {
            0 => Self::NotFound,
            1 => match items.pop() {
                Some(item) => Self::Unique(item),
                None => Self::NotFound,
            },
            _ => Self::Ambiguous(items),
        }
    }

    /// Collapse to an option, turning the ambiguous case into an error.
    pub fn into_option_or<E>(self, ambiguous: impl FnOnce(Vec<T>) -> E) -> Result<Option<T>, E> {
        match self {
            Self::NotFound => Ok(None),
            Self::Unique(item) => Ok(Some(item)),
            Self::Ambiguous(items) => Err(ambiguous(items)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_count() {
        assert_eq!(Lookup::<u8>::from_vec(vec![]), Lookup::NotFound);
        assert_eq!(Lookup::from_vec(vec![7]), Lookup::Unique(7));
        assert_eq!(Lookup::from_vec(vec![7, 8]), Lookup::Ambiguous(vec![7, 8]));
    }

    #[test]
    fn ambiguity_becomes_error() {
        let result = Lookup::from_vec(vec![1, 2, 3]).into_option_or(|all| all.len());
        assert_eq!(result, Err(3));

        let result = Lookup::from_vec(vec![1]).into_option_or(|all: Vec<i32>| all.len());
        assert_eq!(result, Ok(Some(1)));
    }
}
