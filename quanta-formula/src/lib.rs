//! Quanta Formula - dimension-aware formula evaluation
//!
//! Formulas are infix expressions over numbers, unit-tagged numbers such as
//! `3{km}`, references to other values written `[name]`, and function calls.
//! Every intermediate result is a [`quanta_units::QuantityValue`], so adding a
//! mass to a time fails instead of producing a number.

mod ast;
mod eval;
mod functions;
mod lexer;
mod parser;
mod resolver;
mod value;

pub use ast::{BinOp, Expr, UnaryOp};
pub use eval::{references, FormulaEvaluator};
pub use functions::{check_arity, FormulaFunction, FunctionMeta, FunctionTable, MathFunction, Noop};
pub use lexer::{tokenize, Spanned, Token};
pub use parser::parse_formula;
pub use resolver::{MapResolver, NoReferences, Resolver};
pub use value::FormulaValue;
