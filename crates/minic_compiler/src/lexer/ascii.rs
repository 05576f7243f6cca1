//! ASCII bytes the lexer dispatches on.

pub const ZERO: u8 = b'0';
pub const NINE: u8 = b'9';

pub const LOWER_A: u8 = b'a';
pub const LOWER_B: u8 = b'b';
pub const LOWER_N: u8 = b'n';
pub const LOWER_R: u8 = b'r';
pub const LOWER_T: u8 = b't';
pub const LOWER_Z: u8 = b'z';
pub const UPPER_A: u8 = b'A';
pub const UPPER_Z: u8 = b'Z';

pub const UNDERSCORE: u8 = b'_';
pub const DOLLAR: u8 = b'$';

pub const SPACE: u8 = b' ';
pub const TAB: u8 = b'\t';
pub const CARRIAGE_RETURN: u8 = b'\r';
pub const NEWLINE: u8 = b'\n';

pub const QUOTE: u8 = b'"';
pub const BACKSLASH: u8 = b'\\';

pub const PLUS: u8 = b'+';
pub const HYPHEN: u8 = b'-';
pub const STAR: u8 = b'*';
pub const SLASH: u8 = b'/';
pub const EQUAL: u8 = b'=';
pub const BANG: u8 = b'!';
pub const LESS: u8 = b'<';
pub const GREATER: u8 = b'>';

pub const PAREN_OPEN: u8 = b'(';
pub const PAREN_CLOSE: u8 = b')';
pub const BRACE_OPEN: u8 = b'{';
pub const BRACE_CLOSE: u8 = b'}';
pub const COLON: u8 = b':';
pub const COMMA: u8 = b',';
pub const SEMICOLON: u8 = b';';
