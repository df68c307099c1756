use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till},
    character::complete::{digit1, line_ending, space1},
    combinator::{map, map_opt, opt},
    error::{ParseError, VerboseError},
    sequence::{pair, terminated, tuple},
    IResult, ParseTo,
};

pub struct StatusLine<'a> {
    pub http_version: (u16, u16),
    pub status_code: u16,
    pub reason_phrase: &'a [u8],
}

fn http_version_int<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], (u16, u16), E>
where
    E: ParseError<&'a [u8]>,
{
    alt((
        map_opt(tuple((digit1, tag("."), digit1)), |(major, _, minor)| {
            parse_int_pair(major, minor)
        }),
        map_opt(digit1, |major: &[u8]| {
            major.parse_to().map(|num| (num, 0))
        }),
    ))(input)
}

fn parse_int_pair(major: &[u8], minor: &[u8]) -> Option<(u16, u16)> {
    match (major.parse_to(), minor.parse_to()) {
        (Some(major), Some(minor)) => Some((major, minor)),
        _ => None,
    }
}

fn http_version<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], (u16, u16), E>
where
    E: ParseError<&'a [u8]>,
{
    map(pair(tag_no_case("HTTP/"), http_version_int), |pair| pair.1)(input)
}

fn status_code<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], u16, E>
where
    E: ParseError<&'a [u8]>,
{
    map_opt(digit1, |item: &[u8]| item.parse_to())(input)
}

fn reason_phrase<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E>
where
    E: ParseError<&'a [u8]>,
{
    take_till(|c: u8| c.is_ascii_control())(input)
}

fn status_line<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], StatusLine, E>
where
    E: ParseError<&'a [u8]>,
{
    map(
        terminated(
            tuple((
                http_version,
                space1,
                status_code,
                opt(pair(space1, reason_phrase)),
            )),
            opt(line_ending),
        ),
        |(http_version, _, status_code, reason)| StatusLine {
            http_version,
            status_code,
            reason_phrase: reason.map(|pair| pair.1).unwrap_or_default(),
        },
    )(input)
}

pub fn parse_status_line(
    input: &[u8],
) -> Result<StatusLine<'_>, nom::Err<VerboseError<&[u8]>>> {
    let output = status_line::<VerboseError<&[u8]>>(input)?;

    Ok(output.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        let line = parse_status_line(b"HTTP/1.1 200 OK\r\n").unwrap();

        assert_eq!(line.http_version, (1, 1));
        assert_eq!(line.status_code, 200);
        assert_eq!(line.reason_phrase, b"OK");
    }

    #[test]
    fn test_status_line_no_reason() {
        let line = parse_status_line(b"HTTP/1.0 404\r\n").unwrap();

        assert_eq!(line.http_version, (1, 0));
        assert_eq!(line.status_code, 404);
        assert_eq!(line.reason_phrase, b"");
    }

    #[test]
    fn test_status_line_single_digit_version() {
        let line = parse_status_line(b"HTTP/1 200 OK\r\n").unwrap();

        assert_eq!(line.http_version, (1, 0));
    }

    #[test]
    fn test_bad_status_line() {
        assert!(parse_status_line(b"ICY 200 OK\r\n").is_err());
    }
}
