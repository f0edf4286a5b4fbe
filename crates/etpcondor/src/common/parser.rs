use std::fmt::{Debug, Display, Formatter};

use nom::branch::alt;
use nom::bytes::complete::tag_no_case;
use nom::character::complete::{char, satisfy, space0};
use nom::combinator::{all_consuming, map_res, opt, recognize, value};
use nom::error::{ErrorKind, FromExternalError, ParseError};
use nom::multi::many0;
use nom::sequence::{pair, preceded, terminated};
use nom::{AsChar, IResult};

pub enum ParserError<I> {
    Custom(anyhow::Error),
    Nom(I, ErrorKind),
}

impl<I: Debug> Debug for ParserError<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(error) => f.write_fmt(format_args!("Semantic error at {error}")),
            Self::Nom(input, error) => f.write_fmt(format_args!(
                "Parser error at '{input:?}': expecting {error:?}"
            )),
        }
    }
}

impl<I> ParseError<I> for ParserError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        ParserError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I: Display, E: Into<anyhow::Error>> FromExternalError<I, E> for ParserError<I> {
    fn from_external_error(input: I, _: ErrorKind, error: E) -> Self {
        ParserError::Custom(anyhow::anyhow!("'{}': {}", input, error.into()))
    }
}

pub(crate) fn format_parse_error<I: Debug>(error: nom::Err<ParserError<I>>) -> anyhow::Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => anyhow::anyhow!("{:?}", e),
        _ => anyhow::anyhow!(error.to_string()),
    }
}

pub type NomResult<'a, Ret> = IResult<&'a str, Ret, ParserError<&'a str>>;

pub fn consume_all<'a, O, F>(parser: F, input: &'a str) -> anyhow::Result<O>
where
    F: FnMut(&'a str) -> NomResult<'a, O>,
{
    all_consuming(parser)(input)
        .map(|r| r.1)
        .map_err(format_parse_error)
}

fn p_digits(input: &str) -> NomResult<'_, &str> {
    recognize(many0(satisfy(|c: char| c.is_dec_digit())))(input)
}

/// Parses a non-negative decimal number such as `2`, `1.5` or `.5`.
fn p_decimal(input: &str) -> NomResult<'_, f64> {
    map_res(
        recognize(pair(p_digits, opt(preceded(char('.'), p_digits)))),
        |number: &str| {
            if number.is_empty() || number == "." {
                Err(anyhow::anyhow!("missing number"))
            } else {
                number.parse::<f64>().map_err(anyhow::Error::from)
            }
        },
    )(input)
}

/// Parses a size unit into its multiplier. Decimal prefixes are powers of 1000,
/// binary (`*iB`) prefixes are powers of 1024.
fn p_size_unit(input: &str) -> NomResult<'_, u64> {
    const KI: u64 = 1024;
    alt((
        value(KI.pow(4), tag_no_case("TiB")),
        value(KI.pow(3), tag_no_case("GiB")),
        value(KI.pow(2), tag_no_case("MiB")),
        value(KI, tag_no_case("KiB")),
        value(1000u64.pow(4), alt((tag_no_case("TB"), tag_no_case("T")))),
        value(1000u64.pow(3), alt((tag_no_case("GB"), tag_no_case("G")))),
        value(1000u64.pow(2), alt((tag_no_case("MB"), tag_no_case("M")))),
        value(1000, alt((tag_no_case("kB"), tag_no_case("K")))),
        value(1, tag_no_case("B")),
    ))(input)
}

fn p_size(input: &str) -> NomResult<'_, u64> {
    map_res(
        terminated(
            pair(p_decimal, opt(preceded(space0, p_size_unit))),
            space0,
        ),
        |(number, unit)| {
            let bytes = number * unit.unwrap_or(1) as f64;
            if bytes.is_finite() && bytes <= u64::MAX as f64 {
                Ok(bytes as u64)
            } else {
                Err(anyhow::anyhow!("size is too large"))
            }
        },
    )(input)
}

/// Parses a human readable size (e.g. `2 GiB`, `4GB`, `512`) into bytes.
pub fn parse_size(input: &str) -> anyhow::Result<u64> {
    consume_all(p_size, input.trim())
}
