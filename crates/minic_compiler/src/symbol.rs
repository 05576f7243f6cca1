use internment::Intern;

/// Interned string. Used for identifiers, IR operand names, and block labels.
pub type Symbol = Intern<String>;

/// Interns the given string slice.
pub fn symbol(value: impl AsRef<str>) -> Symbol {
  Intern::new(value.as_ref().to_string())
}
