//! Textual EIR.
//!
//! A small line-oriented format used by tests and the `eirdump` tool:
//!
//! ```text
//! ; comment
//! method name(int, ref) -> int {
//! entry:
//!   prologue %a:int, %b:ref
//!   %c:int = move %a
//!   add %c, #1
//!   jump ^exit
//! exit:
//!   return %c
//! }
//! ```
//!
//! A value's kind is required the first time it is mentioned and may be
//! repeated afterwards. Constants are written `#42`, `#3.5:double`,
//! `#-7:long` or `#null`. The method header may end in `@native`,
//! `@cfunction` or `@trampoline` to select a calling convention other
//! than the default `@java`. Locations printed after allocation
//! (`%c:int@rax`) are accepted and ignored when parsing.

mod parser;
mod printer;

pub use parser::{parse_method, parse_methods, parse_methods_with_convention};
pub use printer::{print_live_ranges, print_method};
