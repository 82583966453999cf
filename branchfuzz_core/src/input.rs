pub trait Input: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn as_bytes(&self) -> &[u8];
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    /// Builds an input from raw seed-file contents.
    fn from_bytes(bytes: Vec<u8>) -> Self;
}

impl Input for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
    fn from_bytes(bytes: Vec<u8>) -> Self {
        bytes
    }
}

impl Input for String {
    fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
    fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// An input that can be edited one unit at a time.
///
/// Byte inputs edit individual bytes; text inputs edit `char`s so that a
/// mutation never splits a UTF-8 sequence.
pub trait EditableInput: Input {
    type Unit: Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static;

    fn to_units(&self) -> Vec<Self::Unit>;
    fn from_units(units: Vec<Self::Unit>) -> Self;
}

impl EditableInput for Vec<u8> {
    type Unit = u8;

    fn to_units(&self) -> Vec<u8> {
        self.clone()
    }
    fn from_units(units: Vec<u8>) -> Self {
        units
    }
}

impl EditableInput for String {
    type Unit = char;

    fn to_units(&self) -> Vec<char> {
        self.chars().collect()
    }
    fn from_units(units: Vec<char>) -> Self {
        units.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn vec_u8_impl_input() {
        let data: Vec<u8> = vec![1, 2, 3];
        let empty_data: Vec<u8> = vec![];
        assert_eq!(data.as_bytes(), &[1, 2, 3]);
        assert_eq!(Input::len(&data), 3);
        assert!(!Input::is_empty(&data));
        assert!(Input::is_empty(&empty_data));
    }

    #[test]
    fn string_from_invalid_utf8_is_lossy() {
        let text = <String as Input>::from_bytes(vec![b'o', b'k', 0xFF]);
        assert!(text.starts_with("ok"));
        assert_eq!(text.chars().count(), 3);
    }

    #[test]
    fn text_units_are_chars() {
        let text = "héllo".to_string();
        let units = text.to_units();
        assert_eq!(units.len(), 5);
        assert_eq!(String::from_units(units), text);
    }
}
