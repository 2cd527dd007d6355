//! Built-in expression handlers.
//!
//! The registry is a closed table from identifier to [`Handler`]; lookups
//! ignore case.

use super::faker::{self, Locale, MAX_GENERATED_LENGTH};
use super::parser::{ExpressionArgument, ExpressionInput};
use super::RenderContext;
use crate::error::ExpressionError;
use crate::extract;
use chrono::{TimeDelta, Utc};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt::Write;
use tracing::debug;

/// Default output pattern for dates: RFC 3339 with milliseconds.
pub const DEFAULT_DATE_PATTERN: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    RandomInteger,
    RandomLong,
    RandomDouble,
    RandomBoolean,
    RandomString,
    RandomUuid,
    RandomEnum,
    RandomEmail,
    Date,
    Faker,
    BodyJsonPath,
    BodyXPath,
    BodyRegex,
    PathParameter,
    QueryString,
    RequestHeader,
    UrlHost,
    UrlPort,
    UrlProtocol,
    RequestMethod,
    RequestPath,
}

const REGISTRY: &[(&str, Handler)] = &[
    ("RANDOM_INTEGER", Handler::RandomInteger),
    ("RANDOM_LONG", Handler::RandomLong),
    ("RANDOM_DOUBLE", Handler::RandomDouble),
    ("RANDOM_BOOLEAN", Handler::RandomBoolean),
    ("RANDOM_STRING", Handler::RandomString),
    ("RANDOM_UUID", Handler::RandomUuid),
    ("RANDOM_ENUM", Handler::RandomEnum),
    ("RANDOM_EMAIL", Handler::RandomEmail),
    ("DATE", Handler::Date),
    ("FAKER", Handler::Faker),
    ("BODY_JSON_PATH", Handler::BodyJsonPath),
    ("BODY_XPATH", Handler::BodyXPath),
    ("BODY_REGEX", Handler::BodyRegex),
    ("PATH_PARAMETER", Handler::PathParameter),
    ("QUERY_STRING", Handler::QueryString),
    ("REQUEST_HEADER", Handler::RequestHeader),
    ("URL_HOST", Handler::UrlHost),
    ("URL_PORT", Handler::UrlPort),
    ("URL_PROTOCOL", Handler::UrlProtocol),
    ("REQUEST_METHOD", Handler::RequestMethod),
    ("REQUEST_PATH", Handler::RequestPath),
];

impl Handler {
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(identifier))
            .map(|(_, handler)| *handler)
    }

    pub fn identifier(&self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(_, handler)| handler == self)
            .map_or("", |(name, _)| *name)
    }

    /// Evaluate the handler for one marker.
    pub fn evaluate(
        &self,
        input: &ExpressionInput,
        ctx: &RenderContext<'_>,
    ) -> Result<String, ExpressionError> {
        match self {
            Handler::RandomInteger => {
                let (min, max) = int_bounds(input, 0, 100)?;
                let min = i32::try_from(min)
                    .map_err(|_| ExpressionError::invalid("min", "out of range"))?;
                let max = i32::try_from(max)
                    .map_err(|_| ExpressionError::invalid("max", "out of range"))?;
                Ok(rand::thread_rng().gen_range(min..=max).to_string())
            }
            Handler::RandomLong => {
                let (min, max) = int_bounds(input, 0, i64::MAX)?;
                Ok(rand::thread_rng().gen_range(min..=max).to_string())
            }
            Handler::RandomDouble => {
                let min = float_arg(input, "min", 0)?.unwrap_or(0.0);
                let max = float_arg(input, "max", 1)?.unwrap_or(1.0);
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(ExpressionError::invalid("min", "greater than max"));
                }
                Ok(rand::thread_rng().gen_range(min..=max).to_string())
            }
            Handler::RandomBoolean => Ok(rand::thread_rng().gen::<bool>().to_string()),
            Handler::RandomString => {
                let (min, max) = int_bounds(input, 8, 16)?;
                if min < 0 {
                    return Err(ExpressionError::invalid("min", "negative length"));
                }
                if max > MAX_GENERATED_LENGTH as i64 {
                    return Err(ExpressionError::invalid(
                        "max",
                        format!("longer than {} characters", MAX_GENERATED_LENGTH),
                    ));
                }
                let mut rng = rand::thread_rng();
                let len = rng.gen_range(min..=max) as usize;
                Ok((&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .map(char::from)
                    .collect())
            }
            Handler::RandomUuid => Ok(random_uuid()),
            Handler::RandomEnum => {
                let values: Vec<&ExpressionArgument> = match input.lookup("values", 0) {
                    Some(ExpressionArgument::List(items)) => items.iter().collect(),
                    Some(_) => input.positional(),
                    None => Vec::new(),
                };
                values
                    .choose(&mut rand::thread_rng())
                    .map(|v| v.to_string())
                    .ok_or(ExpressionError::MissingArgument("values"))
            }
            Handler::RandomEmail => {
                faker::generate("internet().safeEmailAddress()", fake_locale(input, ctx))
                    .ok_or(ExpressionError::NoValue)
            }
            Handler::Date => evaluate_date(input),
            Handler::Faker => {
                let api = input
                    .lookup("api", 0)
                    .and_then(ExpressionArgument::as_str)
                    .ok_or(ExpressionError::MissingArgument("api"))?;
                match faker::generate(api, fake_locale(input, ctx)) {
                    Some(value) => Ok(value),
                    None => {
                        debug!(api = %api, "Unrecognized fake data api");
                        Ok(String::new())
                    }
                }
            }
            Handler::BodyJsonPath => {
                extract::json_path(body(ctx)?, required_str(input, "expression", 0)?)
            }
            Handler::BodyXPath => extract::xpath(body(ctx)?, required_str(input, "expression", 0)?),
            Handler::BodyRegex => extract::regex(body(ctx)?, required_str(input, "pattern", 0)?),
            Handler::PathParameter => {
                let name = required_str(input, "parameter", 0)?;
                ctx.path_params
                    .get(name)
                    .cloned()
                    .ok_or(ExpressionError::NoValue)
            }
            Handler::QueryString => {
                let name = required_str(input, "query", 0)?;
                ctx.request
                    .query
                    .first(name)
                    .map(str::to_string)
                    .ok_or(ExpressionError::NoValue)
            }
            Handler::RequestHeader => {
                let name = required_str(input, "name", 0)?;
                ctx.request
                    .header(name)
                    .map(str::to_string)
                    .ok_or(ExpressionError::NoValue)
            }
            Handler::UrlHost => ctx.request.host_name().ok_or(ExpressionError::NoValue),
            Handler::UrlPort => ctx
                .request
                .port_number()
                .map(|p| p.to_string())
                .ok_or(ExpressionError::NoValue),
            Handler::UrlProtocol => Ok(ctx
                .request
                .scheme
                .clone()
                .unwrap_or_else(|| "http".to_string())),
            Handler::RequestMethod => Ok(ctx.request.method.to_ascii_uppercase()),
            Handler::RequestPath => Ok(ctx.request.path.clone()),
        }
    }
}

fn body<'a>(ctx: &RenderContext<'a>) -> Result<&'a str, ExpressionError> {
    ctx.request
        .body_str()
        .ok_or_else(|| ExpressionError::Malformed("request body is not UTF-8".into()))
}

fn required_str<'a>(
    input: &'a ExpressionInput,
    name: &'static str,
    position: usize,
) -> Result<&'a str, ExpressionError> {
    match input.lookup(name, position) {
        Some(ExpressionArgument::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ExpressionError::invalid(name, "expected a string")),
        None => Err(ExpressionError::MissingArgument(name)),
    }
}

fn int_arg(
    input: &ExpressionInput,
    name: &'static str,
    position: usize,
) -> Result<Option<i64>, ExpressionError> {
    match input.lookup(name, position) {
        None => Ok(None),
        Some(arg) => arg
            .as_i64()
            .map(Some)
            .ok_or_else(|| ExpressionError::invalid(name, format!("'{}' is not an integer", arg))),
    }
}

fn float_arg(
    input: &ExpressionInput,
    name: &'static str,
    position: usize,
) -> Result<Option<f64>, ExpressionError> {
    match input.lookup(name, position) {
        None => Ok(None),
        Some(arg) => arg
            .as_f64()
            .map(Some)
            .ok_or_else(|| ExpressionError::invalid(name, format!("'{}' is not a number", arg))),
    }
}

fn int_bounds(input: &ExpressionInput, min: i64, max: i64) -> Result<(i64, i64), ExpressionError> {
    let min = int_arg(input, "min", 0)?.unwrap_or(min);
    let max = int_arg(input, "max", 1)?.unwrap_or(max);
    if min > max {
        return Err(ExpressionError::invalid("min", "greater than max"));
    }
    Ok((min, max))
}

/// Locale from the `locale` argument, else the render context's default.
fn fake_locale(input: &ExpressionInput, ctx: &RenderContext<'_>) -> Locale {
    input
        .get("locale")
        .and_then(ExpressionArgument::as_str)
        .and_then(Locale::parse)
        .or_else(|| Locale::parse(ctx.locale))
        .unwrap_or(Locale::En)
}

/// Convert an amount of a named unit into a time span.
pub(crate) fn time_offset(amount: i64, unit: &str) -> Result<TimeDelta, ExpressionError> {
    let span = match unit.to_ascii_lowercase().as_str() {
        "ms" | "millis" | "milliseconds" => TimeDelta::try_milliseconds(amount),
        "s" | "second" | "seconds" => TimeDelta::try_seconds(amount),
        "m" | "min" | "minute" | "minutes" => TimeDelta::try_minutes(amount),
        "h" | "hour" | "hours" => TimeDelta::try_hours(amount),
        "d" | "day" | "days" => TimeDelta::try_days(amount),
        "w" | "week" | "weeks" => TimeDelta::try_weeks(amount),
        other => {
            return Err(ExpressionError::invalid(
                "unit",
                format!("unknown time unit '{}'", other),
            ))
        }
    };
    span.ok_or_else(|| ExpressionError::invalid("offset", "out of range"))
}

fn evaluate_date(input: &ExpressionInput) -> Result<String, ExpressionError> {
    let offset = int_arg(input, "offset", 0)?.unwrap_or(0);
    let unit = match input.lookup("unit", 1) {
        Some(arg) => arg.to_string(),
        None => "days".to_string(),
    };
    let past = input
        .get("direction")
        .and_then(ExpressionArgument::as_str)
        .is_some_and(|d| d.eq_ignore_ascii_case("past"));
    let pattern = input
        .get("pattern")
        .or_else(|| input.get("format"))
        .and_then(ExpressionArgument::as_str)
        .unwrap_or(DEFAULT_DATE_PATTERN);

    let span = time_offset(offset, &unit)?;
    let now = Utc::now();
    let at = if past {
        now.checked_sub_signed(span)
    } else {
        now.checked_add_signed(span)
    }
    .ok_or_else(|| ExpressionError::invalid("offset", "out of range"))?;

    // Writing avoids the panic `to_string` raises on bad format specifiers
    let mut out = String::new();
    write!(out, "{}", at.format(pattern))
        .map_err(|_| {
            ExpressionError::invalid("pattern", format!("bad date pattern '{}'", pattern))
        })?;
    Ok(out)
}

fn random_uuid() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffffffffffff,
    )
}
