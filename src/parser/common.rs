use std::str::FromStr;

use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, multispace0, one_of, satisfy};
use nom::combinator::{map, map_res, opt, recognize, verify};
use nom::sequence::{pair, preceded, tuple};
use nom::{IResult, Parser};

use crate::declarations::is_identifier;

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Skip leading whitespace before running `parser`.
pub fn ws<'a, O, P>(parser: P) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    P: Parser<&'a str, O, nom::error::Error<&'a str>>,
{
    preceded(multispace0, parser)
}

/// A run of identifier characters, keywords included.
pub fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char)))(input)
}

/// Match a keyword as a whole word, so `order` is never read as `or` followed by `der`.
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(verify(word, move |w: &str| w == kw))
}

/// Identifiers start with an ASCII letter or '_', followed by letters, digits, or '_', and are not
/// keywords (e.g. `x`, `kart1_speed`, `_tmp`).
pub fn identifier(input: &str) -> IResult<&str, String> {
    map(ws(verify(word, is_identifier)), str::to_string)(input)
}

/// Unsigned decimal number with an optional fraction and exponent (`3`, `0.25`, `1e-3`).
pub fn number(input: &str) -> IResult<&str, f64> {
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    let literal = recognize(tuple((digit1, opt(pair(char('.'), digit1)), opt(exponent))));

    map_res(ws(literal), f64::from_str)(input)
}

/// Operator token surrounded by optional whitespace.
pub fn symbol<'a>(token: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(tag(token))
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{identifier, keyword, number};

    #[test]
    fn parse_identifier() -> Result<(), Box<dyn Error>> {
        let (rest, value) = identifier("myvar")?;

        assert_eq!(rest, "");
        assert_eq!(value, "myvar");

        let (rest, value) = identifier("  kart1_speed <= 5")?;

        assert_eq!(rest, " <= 5");
        assert_eq!(value, "kart1_speed");

        assert!(identifier("always").is_err());
        assert!(identifier("1x").is_err());

        Ok(())
    }

    #[test]
    fn parse_keyword_boundary() {
        assert!(keyword("or")("or y").is_ok());
        assert!(keyword("or")("order").is_err());
    }

    #[test]
    fn parse_number() -> Result<(), Box<dyn Error>> {
        let (rest, value) = number("123.345")?;

        assert_eq!(rest, "");
        assert_eq!(value, 123.345);

        let (rest, value) = number("5;")?;

        assert_eq!(rest, ";");
        assert_eq!(value, 5.0);

        let (_, value) = number("1e-3")?;
        assert_eq!(value, 0.001);

        Ok(())
    }
}
