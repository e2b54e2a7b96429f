//! The Pratt parse-rule table: for every token kind, the prefix parser to
//! run when it starts an expression, the infix parser to run when it
//! follows one, and the precedence that infix position binds at. Per
//! spec.md §4.2/§9 ("a dense table keyed by token type, the same shape as
//! clox's rules array").

use crate::compiler::{and_, binary, grouping, literal, number, or_, string, unary, variable};
use crate::compiler::Compiler;
use crate::token::TokenKind;

pub type ParseFn<'src, 'vm> = fn(&mut Compiler<'src, 'vm>, bool);

pub struct ParseRule<'src, 'vm> {
    pub prefix: Option<ParseFn<'src, 'vm>>,
    pub infix: Option<ParseFn<'src, 'vm>>,
    pub precedence: Precedence,
}

/// Precedence ladder, lowest to highest. `Precedence::None` is the floor:
/// nothing binds at or below it, which is how `parse_precedence` refuses to
/// treat a bare statement terminator as part of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ( [
    Primary,
}

impl Precedence {
    pub fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

pub fn get_rule<'src, 'vm>(kind: TokenKind) -> ParseRule<'src, 'vm> {
    use TokenKind::*;
    match kind {
        LeftParen => rule(Some(grouping), None, Precedence::None),
        Minus => rule(Some(unary), Some(binary), Precedence::Term),
        Plus => rule(None, Some(binary), Precedence::Term),
        Slash | Star => rule(None, Some(binary), Precedence::Factor),
        Bang => rule(Some(unary), None, Precedence::None),
        BangEqual => rule(None, Some(binary), Precedence::Equality),
        EqualEqual => rule(None, Some(binary), Precedence::Equality),
        Greater | GreaterEqual | Less | LessEqual => {
            rule(None, Some(binary), Precedence::Comparison)
        }
        Identifier => rule(Some(variable), None, Precedence::None),
        String => rule(Some(string), None, Precedence::None),
        Number => rule(Some(number), None, Precedence::None),
        And => rule(None, Some(and_), Precedence::And),
        Or => rule(None, Some(or_), Precedence::Or),
        Null | True | False => rule(Some(literal), None, Precedence::None),
        _ => rule(None, None, Precedence::None),
    }
}

fn rule<'src, 'vm>(
    prefix: Option<ParseFn<'src, 'vm>>,
    infix: Option<ParseFn<'src, 'vm>>,
    precedence: Precedence,
) -> ParseRule<'src, 'vm> {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}
