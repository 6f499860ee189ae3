use super::nom_prelude::*;

pub fn i64_<'a, E>(input: &'a str) -> IResult<&'a str, i64, E>
  where
    E: ParseError<&'a str> + error::FromExternalError<&'a str, ParseIntError>
{
  map_res(
    recognize(
      pair(
        opt(char('-')),
        digit1
      )
    ), i64::from_str)(input)
}

/// `lo:hi`, surrounding whitespace allowed.
pub fn range_<'a, E>(input: &'a str) -> IResult<&'a str, (i64, i64), E>
  where
    E: ParseError<&'a str> + error::FromExternalError<&'a str, ParseIntError>
{
  separated_pair(
    preceded(space0, i64_),
    delimited(space0, char(':'), space0),
    terminated(i64_, space0),
  )(input)
}

pub fn parse_range(input: &str) -> Option<(i64, i64)> {
  all_consuming(range_::<error::Error<&str>>)(input)
    .finish()
    .ok()
    .map(|(_, r)| r)
}
