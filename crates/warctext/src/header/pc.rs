use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until},
    character::complete::{line_ending, space1},
    combinator::{all_consuming, map},
    error::{ParseError, VerboseError},
    multi::{fold_many0, many0},
    sequence::{pair, separated_pair, terminated},
    IResult,
};

use super::{FieldName, FieldPair, FieldValue, HeaderMap};

fn field_name<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E>
where
    E: ParseError<&'a [u8]>,
{
    take_until(b":".as_slice())(input)
}

enum FieldValueFragment<'a> {
    Literal(&'a [u8]),
    FoldedSep((&'a [u8], &'a [u8])),
}

fn field_value_literal<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E>
where
    E: ParseError<&'a [u8]>,
{
    is_not(b"\r\n".as_slice())(input)
}

fn field_value_folded_sep<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], (&'a [u8], &'a [u8]), E>
where
    E: ParseError<&'a [u8]>,
{
    pair(line_ending, space1)(input)
}

fn field_value_body<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], FieldValueFragment, E>
where
    E: ParseError<&'a [u8]>,
{
    alt((
        map(field_value_folded_sep, FieldValueFragment::FoldedSep),
        map(field_value_literal, FieldValueFragment::Literal),
    ))(input)
}

struct RawAndUnfolded<'a> {
    raw: &'a [u8],
    unfolded: Vec<u8>,
}

fn field_value<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], RawAndUnfolded<'a>, E>
where
    E: ParseError<&'a [u8]>,
{
    let remain_begin = input.len();

    let build_value = fold_many0(field_value_body, Vec::new, |mut buf, fragment| {
        match fragment {
            FieldValueFragment::Literal(bytes) => buf.extend_from_slice(bytes),
            FieldValueFragment::FoldedSep(_) => buf.push(b' '),
        }
        buf
    });

    let (remain, unfolded) = terminated(build_value, line_ending)(input)?;
    let consumed = remain_begin - remain.len();
    let raw = trim_line_ending(&input[..consumed]);

    Ok((remain, RawAndUnfolded { raw, unfolded }))
}

fn trim_line_ending(bytes: &[u8]) -> &[u8] {
    if bytes.ends_with(b"\r\n") {
        &bytes[..bytes.len() - 2]
    } else if bytes.ends_with(b"\n") {
        &bytes[..bytes.len() - 1]
    } else {
        bytes
    }
}

fn field_pair<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], FieldPair, E>
where
    E: ParseError<&'a [u8]>,
{
    map(
        separated_pair(field_name, tag(b":"), field_value),
        |(name_raw, value)| {
            let name = FieldName::new(transform_to_string(name_raw), Some(name_raw.to_vec()));
            let value = FieldValue::new(
                transform_to_string(&value.unfolded),
                Some(value.raw.to_vec()),
            );

            FieldPair::new(name, value)
        },
    )(input)
}

fn field_pairs<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Vec<FieldPair>, E>
where
    E: ParseError<&'a [u8]>,
{
    all_consuming(many0(field_pair))(input)
}

pub fn parse_fields(input: &[u8]) -> Result<HeaderMap, nom::Err<VerboseError<&[u8]>>> {
    let output = field_pairs::<VerboseError<&[u8]>>(input)?;

    Ok(HeaderMap::from(output.1))
}

fn transform_to_string(input: &[u8]) -> String {
    String::from_utf8_lossy(input).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_header() {
        let data = b"k1: v1\r\n\
            k2: v2\r\n";
        let headers = parse_fields(data).unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_str("k1"), Some("v1"));
        assert_eq!(headers.get_str("k2"), Some("v2"));
    }

    #[test]
    fn test_empty_value_header() {
        let data = b"k1:\r\n";
        let headers = parse_fields(data).unwrap();

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get_str("k1"), Some(""));
    }

    #[test]
    fn test_folded_header() {
        let data = b"k1: Hello\r\n\
            \t \tworld!\r\n\
            k2: v2\r\n";
        let headers = parse_fields(data).unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_str("k1"), Some("Hello world!"));
        assert_eq!(headers.get_str("k2"), Some("v2"));
    }

    #[test]
    fn test_bare_newline_endings() {
        let data = b"k1: v1\nk2: v2\n";
        let headers = parse_fields(data).unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_str("k2"), Some("v2"));
    }

    #[test]
    fn test_raw_retained() {
        let data = b"k1:\tv1 \r\n";
        let headers = parse_fields(data).unwrap();
        let value = headers.get("k1").unwrap();

        assert_eq!(value.text, "v1");
        assert_eq!(value.raw.as_deref(), Some(b"\tv1 ".as_slice()));
    }
}
