// Tag bytes shared between the builder and the slice reader. One-off tag
// arithmetic (width bumps, small-int bases) stays at the use sites.

pub const EMPTY_ARRAY: u8 = 0x01;
pub const ARRAY: u8 = 0x06;
pub const EMPTY_OBJECT: u8 = 0x0a;
pub const OBJECT: u8 = 0x0b;
pub const ARRAY_COMPACT: u8 = 0x13;
pub const OBJECT_COMPACT: u8 = 0x14;
pub const ILLEGAL: u8 = 0x17;
pub const NULL: u8 = 0x18;
pub const FALSE: u8 = 0x19;
pub const TRUE: u8 = 0x1a;
pub const DOUBLE: u8 = 0x1b;
pub const UTC_DATE: u8 = 0x1c;
pub const MIN_KEY: u8 = 0x1e;
pub const MAX_KEY: u8 = 0x1f;
pub const STRING_LONG: u8 = 0xbf;
