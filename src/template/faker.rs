//! Synthetic data generation.
//!
//! An api chain such as `name().fullName()` or `commerce().price(10.5, 99)`
//! is looked up in a closed `(category, method)` table. Locale is always
//! passed in explicitly.

use super::handlers::time_offset;
use super::parser::{self, ExpressionArgument};
use chrono::{Duration, Utc};
use fake::faker::address::raw as address;
use fake::faker::boolean::raw::Boolean;
use fake::faker::company::raw as company;
use fake::faker::internet::raw as internet;
use fake::faker::lorem::raw as lorem;
use fake::faker::name::raw as name;
use fake::faker::phone_number::raw as phone;
use fake::locales::{Data, AR_SA, EN, FR_FR, JA_JP, PT_BR, ZH_CN, ZH_TW};
use fake::Fake;
use rand::Rng;

/// Upper bound for any generated length (characters, words, password size).
pub const MAX_GENERATED_LENGTH: usize = 10_000;

/// Locales fake data can be generated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Fr,
    PtBr,
    JaJp,
    ArSa,
    ZhCn,
    ZhTw,
}

impl Locale {
    /// Parse tags such as `en`, `en-GB`, `fr_FR`, `pt-BR`, `zh-TW`.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim().replace('_', "-").to_ascii_lowercase();
        let mut parts = tag.split('-');
        match (parts.next()?, parts.next()) {
            ("en", _) => Some(Locale::En),
            ("fr", _) => Some(Locale::Fr),
            ("pt", _) => Some(Locale::PtBr),
            ("ja", _) => Some(Locale::JaJp),
            ("ar", _) => Some(Locale::ArSa),
            ("zh", Some("tw" | "hk" | "hant")) => Some(Locale::ZhTw),
            ("zh", _) => Some(Locale::ZhCn),
            _ => None,
        }
    }

    /// Decimal separator used when formatting fractional values.
    fn decimal_separator(&self) -> char {
        match self {
            Locale::Fr | Locale::PtBr => ',',
            _ => '.',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generator {
    FirstName,
    LastName,
    FullName,
    Title,
    City,
    StreetName,
    StreetAddress,
    BuildingNumber,
    ZipCode,
    State,
    StateAbbr,
    Country,
    CountryCode,
    SecondaryAddress,
    FullAddress,
    CompanyName,
    Industry,
    Buzzword,
    Profession,
    FreeEmail,
    SafeEmail,
    Username,
    Password,
    Ipv4,
    DomainSuffix,
    UserAgent,
    PhoneNumber,
    CellPhone,
    Word,
    Words,
    Sentence,
    Paragraph,
    NumberBetween,
    RandomDigit,
    RandomNumber,
    Price,
    Bool,
    DateFuture,
    DatePast,
    Birthday,
}

/// `(category, method)` pairs, matched case-insensitively.
const GENERATORS: &[(&str, &str, Generator)] = &[
    ("name", "firstName", Generator::FirstName),
    ("name", "lastName", Generator::LastName),
    ("name", "fullName", Generator::FullName),
    ("name", "name", Generator::FullName),
    ("name", "title", Generator::Title),
    ("name", "username", Generator::Username),
    ("address", "city", Generator::City),
    ("address", "cityName", Generator::City),
    ("address", "streetName", Generator::StreetName),
    ("address", "streetAddress", Generator::StreetAddress),
    ("address", "buildingNumber", Generator::BuildingNumber),
    ("address", "zipCode", Generator::ZipCode),
    ("address", "zipCodeByState", Generator::ZipCode),
    ("address", "state", Generator::State),
    ("address", "stateAbbr", Generator::StateAbbr),
    ("address", "country", Generator::Country),
    ("address", "countryCode", Generator::CountryCode),
    ("address", "secondaryAddress", Generator::SecondaryAddress),
    ("address", "fullAddress", Generator::FullAddress),
    ("company", "name", Generator::CompanyName),
    ("company", "industry", Generator::Industry),
    ("company", "buzzword", Generator::Buzzword),
    ("company", "profession", Generator::Profession),
    ("internet", "emailAddress", Generator::FreeEmail),
    ("internet", "safeEmailAddress", Generator::SafeEmail),
    ("internet", "username", Generator::Username),
    ("internet", "password", Generator::Password),
    ("internet", "ipV4Address", Generator::Ipv4),
    ("internet", "domainSuffix", Generator::DomainSuffix),
    ("internet", "userAgent", Generator::UserAgent),
    ("phoneNumber", "phoneNumber", Generator::PhoneNumber),
    ("phoneNumber", "cellPhone", Generator::CellPhone),
    ("lorem", "word", Generator::Word),
    ("lorem", "words", Generator::Words),
    ("lorem", "sentence", Generator::Sentence),
    ("lorem", "paragraph", Generator::Paragraph),
    ("number", "numberBetween", Generator::NumberBetween),
    ("number", "randomDigit", Generator::RandomDigit),
    ("number", "randomNumber", Generator::RandomNumber),
    ("commerce", "price", Generator::Price),
    ("bool", "bool", Generator::Bool),
    ("date", "future", Generator::DateFuture),
    ("date", "past", Generator::DatePast),
    ("date", "birthday", Generator::Birthday),
];

fn lookup(category: &str, method: &str) -> Option<Generator> {
    GENERATORS
        .iter()
        .find(|(c, m, _)| c.eq_ignore_ascii_case(category) && m.eq_ignore_ascii_case(method))
        .map(|(_, _, g)| *g)
}

/// Generate a value for an api chain. `None` when the chain is malformed,
/// unknown, or its arguments do not fit the generator.
pub fn generate(api: &str, locale: Locale) -> Option<String> {
    let calls = parser::parse_chain(api).ok()?;
    let [category, method] = calls.as_slice() else {
        return None;
    };
    let generator = lookup(category.name, method.name)?;
    let args = parser::split_arguments(method.args)
        .ok()?
        .into_iter()
        .map(parser::parse_value)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    match locale {
        Locale::En => run(generator, EN, locale, &args),
        Locale::Fr => run(generator, FR_FR, locale, &args),
        Locale::PtBr => run(generator, PT_BR, locale, &args),
        Locale::JaJp => run(generator, JA_JP, locale, &args),
        Locale::ArSa => run(generator, AR_SA, locale, &args),
        Locale::ZhCn => run(generator, ZH_CN, locale, &args),
        Locale::ZhTw => run(generator, ZH_TW, locale, &args),
    }
}

fn int_arg(args: &[ExpressionArgument], index: usize) -> Option<i64> {
    args.get(index).and_then(ExpressionArgument::as_i64)
}

/// Optional length argument. Negative or over-limit values reject the call.
fn length_arg(args: &[ExpressionArgument], index: usize) -> Option<Option<usize>> {
    match args.get(index) {
        None => Some(None),
        Some(arg) => {
            let value = arg.as_i64()?;
            let value = usize::try_from(value).ok()?;
            (value <= MAX_GENERATED_LENGTH).then_some(Some(value))
        }
    }
}

fn run<L: Data + Copy>(
    generator: Generator,
    l: L,
    locale: Locale,
    args: &[ExpressionArgument],
) -> Option<String> {
    let mut rng = rand::thread_rng();

    let value: String = match generator {
        Generator::FirstName => name::FirstName(l).fake(),
        Generator::LastName => name::LastName(l).fake(),
        Generator::FullName => name::Name(l).fake(),
        Generator::Title => name::Title(l).fake(),
        Generator::City => address::CityName(l).fake(),
        Generator::StreetName => address::StreetName(l).fake(),
        Generator::StreetAddress => {
            let number: String = address::BuildingNumber(l).fake();
            let street: String = address::StreetName(l).fake();
            let with_secondary = args.first().and_then(ExpressionArgument::as_bool);
            if with_secondary == Some(true) {
                let secondary: String = address::SecondaryAddress(l).fake();
                format!("{} {} {}", number, street, secondary)
            } else {
                format!("{} {}", number, street)
            }
        }
        Generator::BuildingNumber => address::BuildingNumber(l).fake(),
        Generator::ZipCode => address::ZipCode(l).fake(),
        Generator::State => address::StateName(l).fake(),
        Generator::StateAbbr => address::StateAbbr(l).fake(),
        Generator::Country => address::CountryName(l).fake(),
        Generator::CountryCode => address::CountryCode(l).fake(),
        Generator::SecondaryAddress => address::SecondaryAddress(l).fake(),
        Generator::FullAddress => {
            let number: String = address::BuildingNumber(l).fake();
            let street: String = address::StreetName(l).fake();
            let city: String = address::CityName(l).fake();
            let state: String = address::StateAbbr(l).fake();
            let zip: String = address::ZipCode(l).fake();
            format!("{} {}, {}, {} {}", number, street, city, state, zip)
        }
        Generator::CompanyName => company::CompanyName(l).fake(),
        Generator::Industry => company::Industry(l).fake(),
        Generator::Buzzword => company::Buzzword(l).fake(),
        Generator::Profession => company::Profession(l).fake(),
        Generator::FreeEmail => internet::FreeEmail(l).fake(),
        Generator::SafeEmail => internet::SafeEmail(l).fake(),
        Generator::Username => internet::Username(l).fake(),
        Generator::Password => {
            let min = length_arg(args, 0)?.unwrap_or(8).max(1);
            let max = length_arg(args, 1)?.unwrap_or(min + 8).max(min + 1);
            internet::Password(l, min..max).fake()
        }
        Generator::Ipv4 => internet::IPv4(l).fake(),
        Generator::DomainSuffix => internet::DomainSuffix(l).fake(),
        Generator::UserAgent => internet::UserAgent(l).fake(),
        Generator::PhoneNumber => phone::PhoneNumber(l).fake(),
        Generator::CellPhone => phone::CellNumber(l).fake(),
        Generator::Word => lorem::Word(l).fake(),
        Generator::Words => {
            let count = length_arg(args, 0)?.unwrap_or(3).max(1);
            let words: Vec<String> = lorem::Words(l, count..count + 1).fake();
            words.join(" ")
        }
        Generator::Sentence => lorem::Sentence(l, 4..10).fake(),
        Generator::Paragraph => lorem::Paragraph(l, 3..6).fake(),
        Generator::NumberBetween => {
            let min = int_arg(args, 0)?;
            let max = int_arg(args, 1)?;
            if min > max {
                return None;
            }
            rng.gen_range(min..=max).to_string()
        }
        Generator::RandomDigit => rng.gen_range(0..=9).to_string(),
        Generator::RandomNumber => {
            let digits = int_arg(args, 0).unwrap_or(9).clamp(1, 18) as u32;
            rng.gen_range(0..10_i64.pow(digits)).to_string()
        }
        Generator::Price => {
            let min = args.first().and_then(ExpressionArgument::as_f64).unwrap_or(1.0);
            let max = args.get(1).and_then(ExpressionArgument::as_f64).unwrap_or(1000.0);
            if min.is_nan() || max.is_nan() || min > max {
                return None;
            }
            let price = rng.gen_range(min..=max);
            format_decimal(price, locale)
        }
        Generator::Bool => {
            let value: bool = Boolean(l, 50).fake();
            value.to_string()
        }
        Generator::DateFuture | Generator::DatePast => {
            let amount = int_arg(args, 0)?;
            let unit = args.get(1).map(ToString::to_string);
            let span = time_offset(amount, unit.as_deref().unwrap_or("days")).ok()?;
            let millis = span.num_milliseconds();
            if millis <= 0 {
                return None;
            }
            // Strictly after (or before) now, at most `span` away
            let jitter = Duration::milliseconds(rng.gen_range(1..=millis));
            let now = Utc::now();
            // The whole span must stay within the representable date range
            let at = if generator == Generator::DateFuture {
                now.checked_add_signed(span)?;
                now.checked_add_signed(jitter)?
            } else {
                now.checked_sub_signed(span)?;
                now.checked_sub_signed(jitter)?
            };
            at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        }
        Generator::Birthday => {
            let days = rng.gen_range(18 * 365..=65 * 365);
            (Utc::now() - Duration::days(days))
                .format("%Y-%m-%d")
                .to_string()
        }
    };

    Some(value)
}

/// Format with two decimals and the locale's separator.
fn format_decimal(value: f64, locale: Locale) -> String {
    let text = format!("{:.2}", value);
    match locale.decimal_separator() {
        '.' => text,
        sep => text.replace('.', &sep.to_string()),
    }
}
