//! Static types of the script language and their binary-format encoding.

use std::fmt;

/// Types a declaration or expression can carry. `Unit` only ever appears as a
/// function return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
  Int,
  Boolean,
  Str,
  Unit,
  Array(Box<Type>),
}

impl Type {
  pub fn array_of(elem: Type) -> Self {
    Self::Array(Box::new(elem))
  }

  pub fn is_int(&self) -> bool {
    matches!(self, Self::Int)
  }

  pub fn is_boolean(&self) -> bool {
    matches!(self, Self::Boolean)
  }

  /// Element type of an array, if this is one.
  pub fn elem(&self) -> Option<&Type> {
    match self {
      Self::Array(elem) => Some(elem),
      _ => None,
    }
  }

  /// The type code used inside method descriptors.
  pub fn descriptor(&self) -> String {
    match self {
      Self::Int => "I".to_string(),
      Self::Boolean => "Z".to_string(),
      Self::Str => "Ljava/lang/String;".to_string(),
      Self::Unit => "V".to_string(),
      Self::Array(elem) => format!("[{}", elem.descriptor()),
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int => write!(f, "Int"),
      Self::Boolean => write!(f, "Boolean"),
      Self::Str => write!(f, "String"),
      Self::Unit => write!(f, "Unit"),
      Self::Array(elem) => write!(f, "Array<{elem}>"),
    }
  }
}

/// Build the method descriptor for a parameter list and return type.
pub fn method_descriptor<'a>(
  params: impl IntoIterator<Item = &'a Type>,
  return_type: &Type,
) -> String {
  let mut descriptor = String::from("(");
  for param in params {
    descriptor.push_str(&param.descriptor());
  }
  descriptor.push(')');
  descriptor.push_str(&return_type.descriptor());
  descriptor
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn descriptor_codes() {
    assert_eq!(Type::Int.descriptor(), "I");
    assert_eq!(Type::Boolean.descriptor(), "Z");
    assert_eq!(Type::Str.descriptor(), "Ljava/lang/String;");
    assert_eq!(Type::array_of(Type::Int).descriptor(), "[I");
  }

  #[test]
  fn method_descriptor_concatenates_params() {
    let descriptor = method_descriptor([&Type::Int, &Type::Str], &Type::Boolean);
    assert_eq!(descriptor, "(ILjava/lang/String;)Z");
  }
}
