pub mod machine;
pub(crate) mod parser;

pub use machine::{
    graphics::{GraphicsState, Matrix, PageEvent, PathSegment, Point, Rgb},
    Machine, MachineError, MachineResult, ScriptError, Token, TokenArray, Value,
};

/// Interpreter name value
pub type Name = kstring::KStringBase<Box<str>>;

/// Create Name from `&str`
#[inline]
#[must_use]
pub fn name(s: &str) -> Name {
    Name::from_ref(s)
}

#[inline]
#[must_use]
pub const fn sname(s: &'static str) -> Name {
    Name::from_static(s)
}
