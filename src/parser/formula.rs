//! Grammar of the formula language.
//!
//! The parsers in this module produce an unresolved syntax tree in which identifiers are still
//! names. Every node remembers how much input remained when it started so that later stages can
//! report byte positions.
use std::fmt::{Display, Formatter};

use nom::branch::alt;
use nom::character::complete::{char, multispace0};
use nom::combinator::{cut, map, not, opt, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated, tuple};
use nom::{IResult, Parser};
use nonempty::NonEmpty;

use super::common::{identifier, keyword, number, symbol, ws};
use crate::expr::{ArithOp, CmpOp, Connective, TemporalOp};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub remaining: usize,
    pub kind: Kind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Kind {
    Number(f64),
    Truth(bool),
    Ident(String),
    Negate(Box<Node>),
    Abs(Box<Node>),
    Arithmetic(ArithOp, Box<Node>, Box<Node>),
    Comparison(CmpOp, Box<Node>, Box<Node>),
    Not(Box<Node>),
    Connective(Connective, Box<NonEmpty<Node>>),
    Implies(Box<Node>, Box<Node>),
    Temporal(TemporalOp, Bound, Bound, Box<Node>),
}

/// Temporal bound as written: a (possibly negative) number or the name of a constant.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bound {
    Number(f64),
    Name(String),
}

impl Display for Bound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", value),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawStatement {
    pub name: Option<String>,
    pub body: Node,
}

fn located<'a, P>(mut parser: P) -> impl FnMut(&'a str) -> IResult<&'a str, Node>
where
    P: Parser<&'a str, Kind, nom::error::Error<&'a str>>,
{
    move |input: &'a str| {
        let (input, _) = multispace0(input)?;
        let remaining = input.len();
        let (rest, kind) = parser.parse(input)?;

        Ok((rest, Node { remaining, kind }))
    }
}

fn fold_binary<O, F>(first: Node, others: Vec<(O, Node)>, ctor: F) -> Node
where
    F: Fn(O, Box<Node>, Box<Node>) -> Kind,
{
    others.into_iter().fold(first, |left, (op, right)| Node {
        remaining: left.remaining,
        kind: ctor(op, Box::new(left), Box::new(right)),
    })
}

fn parenthesized(input: &str) -> IResult<&str, Node> {
    delimited(symbol("("), implies, cut(symbol(")")))(input)
}

fn factor(input: &str) -> IResult<&str, Node> {
    let negate = map(preceded(char('-'), factor), |n| Kind::Negate(Box::new(n)));
    let abs = map(preceded(keyword("abs"), cut(parenthesized)), |n| Kind::Abs(Box::new(n)));

    alt((
        located(negate),
        located(map(number, Kind::Number)),
        located(value(Kind::Truth(true), keyword("true"))),
        located(value(Kind::Truth(false), keyword("false"))),
        located(abs),
        located(map(identifier, Kind::Ident)),
        parenthesized,
    ))(input)
}

fn product(input: &str) -> IResult<&str, Node> {
    let operator = alt((value(ArithOp::Mul, char('*')), value(ArithOp::Div, char('/'))));
    let (rest, (first, others)) = pair(factor, many0(pair(ws(operator), factor)))(input)?;

    Ok((rest, fold_binary(first, others, Kind::Arithmetic)))
}

fn sum(input: &str) -> IResult<&str, Node> {
    let minus = terminated(char('-'), not(char('>')));
    let operator = alt((value(ArithOp::Add, char('+')), value(ArithOp::Sub, minus)));
    let (rest, (first, others)) = pair(product, many0(pair(ws(operator), product)))(input)?;

    Ok((rest, fold_binary(first, others, Kind::Arithmetic)))
}

fn relop(input: &str) -> IResult<&str, CmpOp> {
    ws(alt((
        value(CmpOp::Le, char('<').and(char('='))),
        value(CmpOp::Ge, char('>').and(char('='))),
        value(CmpOp::Eq, char('=').and(char('='))),
        value(CmpOp::Ne, char('!').and(char('='))),
        value(CmpOp::Lt, char('<')),
        value(CmpOp::Gt, char('>')),
    )))(input)
}

fn comparison(input: &str) -> IResult<&str, Node> {
    let (rest, (left, right)) = pair(sum, opt(pair(relop, cut(sum))))(input)?;

    let node = match right {
        None => left,
        Some((op, right)) => Node {
            remaining: left.remaining,
            kind: Kind::Comparison(op, Box::new(left), Box::new(right)),
        },
    };

    Ok((rest, node))
}

fn bound(input: &str) -> IResult<&str, Bound> {
    let signed = map(pair(opt(symbol("-")), number), |(sign, value)| match sign {
        Some(_) => Bound::Number(-value),
        None => Bound::Number(value),
    });

    alt((signed, map(identifier, Bound::Name)))(input)
}

fn bounds(input: &str) -> IResult<&str, (Bound, Bound)> {
    delimited(symbol("["), separated_pair(bound, symbol(":"), bound), symbol("]"))(input)
}

fn temporal_op(input: &str) -> IResult<&str, TemporalOp> {
    alt((
        value(TemporalOp::Eventually, keyword("eventually")),
        value(TemporalOp::Always, keyword("always")),
        value(TemporalOp::Once, keyword("once")),
        value(TemporalOp::Historically, keyword("historically")),
    ))(input)
}

fn temporal(input: &str) -> IResult<&str, Node> {
    let operator = pair(temporal_op, cut(pair(bounds, unary)));

    located(map(operator, |(op, ((lower, upper), operand))| {
        Kind::Temporal(op, lower, upper, Box::new(operand))
    }))(input)
}

fn negation(input: &str) -> IResult<&str, Node> {
    let operator = alt((keyword("not"), terminated(symbol("!"), not(char('=')))));

    located(map(preceded(operator, cut(unary)), |n| Kind::Not(Box::new(n))))(input)
}

fn unary(input: &str) -> IResult<&str, Node> {
    alt((negation, temporal, comparison))(input)
}

fn connective<'a, O>(
    kind: Connective,
    mut operator: O,
    operand: fn(&'a str) -> IResult<&'a str, Node>,
) -> impl FnMut(&'a str) -> IResult<&'a str, Node>
where
    O: Parser<&'a str, &'a str, nom::error::Error<&'a str>>,
{
    move |input: &'a str| {
        let (mut rest, head) = operand(input)?;
        let mut tail = Vec::new();

        loop {
            match operator.parse(rest) {
                Ok((next, _)) => {
                    let (next, node) = cut(operand)(next)?;
                    tail.push(node);
                    rest = next;
                }
                Err(nom::Err::Error(_)) => break,
                Err(e) => return Err(e),
            }
        }

        if tail.is_empty() {
            return Ok((rest, head));
        }

        let remaining = head.remaining;
        let operands = Box::new(NonEmpty { head, tail });

        Ok((rest, Node { remaining, kind: Kind::Connective(kind, operands) }))
    }
}

fn conjunct(input: &str) -> IResult<&str, Node> {
    let operator = alt((keyword("and"), symbol("&&"), symbol(r"/\")));
    connective(Connective::And, operator, unary)(input)
}

fn disjunct(input: &str) -> IResult<&str, Node> {
    let operator = alt((keyword("or"), symbol("||"), symbol(r"\/")));
    connective(Connective::Or, operator, conjunct)(input)
}

/// Implication is right-associative: `a implies b implies c` reads as `a implies (b implies c)`.
pub(crate) fn implies(input: &str) -> IResult<&str, Node> {
    let operator = alt((keyword("implies"), symbol("->")));
    let (rest, (antecedent, consequent)) = pair(disjunct, opt(preceded(operator, cut(implies))))(input)?;

    let node = match consequent {
        None => antecedent,
        Some(consequent) => Node {
            remaining: antecedent.remaining,
            kind: Kind::Implies(Box::new(antecedent), Box::new(consequent)),
        },
    };

    Ok((rest, node))
}

/// `[name =] formula [;]`
pub(crate) fn statement(input: &str) -> IResult<&str, RawStatement> {
    let binding = terminated(identifier, pair(symbol("="), not(char('='))));
    let ending = tuple((opt(symbol(";")), multispace0));
    let (rest, (name, body)) = terminated(pair(opt(binding), implies), ending)(input)?;

    Ok((rest, RawStatement { name, body }))
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{implies, statement, Bound, Kind};
    use crate::expr::{Connective, TemporalOp};

    #[test]
    fn parse_comparison() -> Result<(), Box<dyn Error>> {
        let (rest, node) = implies("kart1_speed <= 10")?;

        assert_eq!(rest, "");
        assert!(matches!(node.kind, Kind::Comparison(..)));

        let (rest, _) = implies("3.1*x + 22.4*y >= -4.8*z / 2")?;
        assert_eq!(rest, "");

        Ok(())
    }

    #[test]
    fn parse_connectives() -> Result<(), Box<dyn Error>> {
        let (rest, node) = implies("x <= 1 and y <= 2 and z <= 3 or w > 0")?;

        assert_eq!(rest, "");
        match node.kind {
            Kind::Connective(Connective::Or, operands) => {
                assert_eq!(operands.len(), 2);
                assert!(matches!(operands.head.kind, Kind::Connective(Connective::And, ref and) if and.len() == 3));
            }
            other => panic!("unexpected node {:?}", other),
        }

        let (rest, _) = implies(r"(x <= 1 /\ y <= 2) \/ !(z == 3) && w != 4")?;
        assert_eq!(rest, "");

        Ok(())
    }

    #[test]
    fn parse_implies() -> Result<(), Box<dyn Error>> {
        let (rest, node) = implies("a -> b implies c")?;

        assert_eq!(rest, "");
        match node.kind {
            Kind::Implies(_, consequent) => assert!(matches!(consequent.kind, Kind::Implies(..))),
            other => panic!("unexpected node {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn parse_temporal() -> Result<(), Box<dyn Error>> {
        let (rest, node) = implies("eventually[0:T](always[0:2](dry_sand))")?;

        assert_eq!(rest, "");
        match node.kind {
            Kind::Temporal(TemporalOp::Eventually, lower, upper, operand) => {
                assert_eq!(lower, Bound::Number(0.0));
                assert_eq!(upper, Bound::Name("T".to_string()));
                assert!(matches!(operand.kind, Kind::Temporal(TemporalOp::Always, ..)));
            }
            other => panic!("unexpected node {:?}", other),
        }

        let (rest, _) = implies("historically [ 1 : 3 ] once[0:1] x > 0")?;
        assert_eq!(rest, "");

        assert!(implies("eventually (x <= 1)").is_err());

        Ok(())
    }

    #[test]
    fn parse_statement() -> Result<(), Box<dyn Error>> {
        let (rest, stmt) = statement("out = ((surface == threshold) implies response);")?;

        assert_eq!(rest, "");
        assert_eq!(stmt.name.as_deref(), Some("out"));
        assert!(matches!(stmt.body.kind, Kind::Implies(..)));

        let (rest, stmt) = statement("collision_detection <= 0;")?;

        assert_eq!(rest, "");
        assert_eq!(stmt.name, None);

        Ok(())
    }

    #[test]
    fn record_positions() -> Result<(), Box<dyn Error>> {
        let text = "x <= 1 and  eventually[0:1](y > 2)";
        let (_, node) = implies(text)?;

        match node.kind {
            Kind::Connective(_, operands) => {
                assert_eq!(text.len() - operands.head.remaining, 0);
                assert_eq!(text.len() - operands.tail[0].remaining, 12);
            }
            other => panic!("unexpected node {:?}", other),
        }

        Ok(())
    }
}
