//! Fake-data generators for `__faker` directives.
//!
//! Generators live in a closed registry keyed by dotted name
//! (`person.firstName`). Each request gets its own [`FakeGenerator`]; with a
//! seed, every request starts from the same generator state.

use crate::template::RenderError;
use chrono::{Duration, SecondsFormat, TimeZone, Utc};
use fake::faker::address::en::{BuildingNumber, CityName, CountryName, StreetName, ZipCode};
use fake::faker::company::en::{Buzzword, CatchPhase, CompanyName};
use fake::faker::internet::en::{DomainSuffix, IPv4, SafeEmail, Username};
use fake::faker::job::en::Title as JobTitle;
use fake::faker::lorem::en::{Paragraph, Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Longest string or word list a single call may produce.
const MAX_LENGTH: u64 = 100_000;

const ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

type Generator = fn(&mut StdRng, &[Value]) -> Result<Value, String>;

static REGISTRY: OnceLock<HashMap<&'static str, Generator>> = OnceLock::new();

fn registry() -> &'static HashMap<&'static str, Generator> {
    REGISTRY.get_or_init(|| {
        let entries: [(&'static str, Generator); 30] = [
            ("person.firstName", |rng, _| text(FirstName().fake_with_rng(rng))),
            ("person.lastName", |rng, _| text(LastName().fake_with_rng(rng))),
            ("person.fullName", |rng, _| text(Name().fake_with_rng(rng))),
            ("person.jobTitle", |rng, _| text(JobTitle().fake_with_rng(rng))),
            ("internet.email", |rng, _| text(SafeEmail().fake_with_rng(rng))),
            ("internet.userName", |rng, _| text(Username().fake_with_rng(rng))),
            ("internet.ipv4", |rng, _| text(IPv4().fake_with_rng(rng))),
            ("internet.url", internet_url),
            ("company.name", |rng, _| text(CompanyName().fake_with_rng(rng))),
            ("company.catchPhrase", |rng, _| text(CatchPhase().fake_with_rng(rng))),
            ("company.buzzword", |rng, _| text(Buzzword().fake_with_rng(rng))),
            ("phone.number", |rng, _| text(PhoneNumber().fake_with_rng(rng))),
            ("location.city", |rng, _| text(CityName().fake_with_rng(rng))),
            ("location.country", |rng, _| text(CountryName().fake_with_rng(rng))),
            ("location.streetAddress", street_address),
            ("location.zipCode", |rng, _| text(ZipCode().fake_with_rng(rng))),
            ("lorem.word", |rng, _| text(Word().fake_with_rng(rng))),
            ("lorem.words", lorem_words),
            ("lorem.sentence", lorem_sentence),
            ("lorem.paragraph", lorem_paragraph),
            ("string.uuid", string_uuid),
            ("string.alpha", |rng, args| {
                let len = length_arg(args, 1)?;
                text((0..len).map(|_| ALPHA[rng.gen_range(0..ALPHA.len())] as char).collect())
            }),
            ("string.alphanumeric", |rng, args| {
                let len = length_arg(args, 1)?;
                text((0..len).map(|_| rng.sample(Alphanumeric) as char).collect())
            }),
            ("string.numeric", |rng, args| {
                let len = length_arg(args, 1)?;
                text((0..len).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect())
            }),
            ("number.int", number_int),
            ("number.float", number_float),
            ("datatype.boolean", datatype_boolean),
            ("date.past", |rng, args| date_offset(rng, args, -1)),
            ("date.future", |rng, args| date_offset(rng, args, 1)),
            ("helpers.arrayElement", array_element),
        ];
        entries.into_iter().collect()
    })
}

/// Whether a dotted method name is registered.
pub fn is_known(method: &str) -> bool {
    registry().contains_key(method)
}

/// All registered method names, sorted.
pub fn methods() -> Vec<&'static str> {
    let mut names: Vec<_> = registry().keys().copied().collect();
    names.sort_unstable();
    names
}

/// Explicit fake-data generator handle carried in a render context.
pub struct FakeGenerator {
    rng: StdRng,
}

impl FakeGenerator {
    /// A seeded generator always starts from the same state.
    pub fn new(seed: Option<i64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed as u64),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Invoke a registered generator.
    pub fn call(&mut self, method: &str, args: &[Value]) -> Result<Value, RenderError> {
        let generator = registry()
            .get(method)
            .ok_or_else(|| RenderError::UnknownFakerMethod(method.to_string()))?;
        generator(&mut self.rng, args).map_err(|reason| RenderError::InvalidFakerArgs {
            method: method.to_string(),
            reason,
        })
    }

    /// Uniform integer in `min..=max`. Caller guarantees `min <= max`.
    pub fn int_between(&mut self, min: u64, max: u64) -> u64 {
        self.rng.gen_range(min..=max)
    }
}

fn text(s: String) -> Result<Value, String> {
    Ok(Value::String(s))
}

fn internet_url(rng: &mut StdRng, _: &[Value]) -> Result<Value, String> {
    let host: String = Word().fake_with_rng(rng);
    let suffix: String = DomainSuffix().fake_with_rng(rng);
    text(format!("https://{}.{}", host.to_lowercase(), suffix))
}

fn street_address(rng: &mut StdRng, _: &[Value]) -> Result<Value, String> {
    let number: String = BuildingNumber().fake_with_rng(rng);
    let street: String = StreetName().fake_with_rng(rng);
    text(format!("{} {}", number, street))
}

fn lorem_words(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let count = length_arg(args, 3)? as usize;
    let words: Vec<String> = Words(count..count + 1).fake_with_rng(rng);
    text(words.join(" "))
}

fn lorem_sentence(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let words = if args.is_empty() {
        3..10
    } else {
        let n = length_arg(args, 1)?.max(1) as usize;
        n..n + 1
    };
    text(Sentence(words).fake_with_rng(rng))
}

fn lorem_paragraph(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let n = length_arg(args, 3)?.max(1) as usize;
    text(Paragraph(n..n + 1).fake_with_rng(rng))
}

fn string_uuid(rng: &mut StdRng, _: &[Value]) -> Result<Value, String> {
    let uuid = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
    text(uuid.to_string())
}

fn number_int(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let (min, max) = int_bounds(args, 0, 9_007_199_254_740_991)?;
    Ok(Value::from(rng.gen_range(min..=max)))
}

fn number_float(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let opts = args.first();
    let (min, max) = match opts {
        None | Some(Value::Null) => (0.0, 1.0),
        Some(Value::Number(n)) => (0.0, n.as_f64().unwrap_or(1.0)),
        Some(Value::Object(o)) => (
            float_field(o, "min")?.unwrap_or(0.0),
            float_field(o, "max")?.unwrap_or(1.0),
        ),
        Some(_) => return Err("expected a number or {min, max, fractionDigits}".into()),
    };
    if max < min {
        return Err(format!("max must be >= min (min={}, max={})", min, max));
    }

    let mut value = if max > min { rng.gen_range(min..=max) } else { min };
    if let Some(Value::Object(o)) = opts {
        if let Some(digits) = o.get("fractionDigits") {
            let digits = digits
                .as_u64()
                .filter(|d| *d <= 15)
                .ok_or("fractionDigits must be an integer between 0 and 15")?;
            let factor = 10f64.powi(digits as i32);
            value = (value * factor).round() / factor;
        }
    }
    Ok(Value::from(value))
}

fn datatype_boolean(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let probability = match args.first() {
        None | Some(Value::Null) => 0.5,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.5),
        Some(Value::Object(o)) => float_field(o, "probability")?.unwrap_or(0.5),
        Some(_) => return Err("expected a probability".into()),
    };
    if !(0.0..=1.0).contains(&probability) {
        return Err("probability must be between 0 and 1".into());
    }
    Ok(Value::Bool(rng.gen_bool(probability)))
}

/// Timestamp within `years` of a UTC day boundary: today's start for past
/// dates, tomorrow's start for future ones. Seeded output stays stable for
/// the whole day and never lands on the wrong side of now.
fn date_offset(rng: &mut StdRng, args: &[Value], direction: i64) -> Result<Value, String> {
    let years = match args.first() {
        None | Some(Value::Null) => 1,
        Some(Value::Number(n)) => n.as_u64().ok_or("years must be a positive integer")?,
        Some(Value::Object(o)) => match o.get("years") {
            None => 1,
            Some(v) => v.as_u64().ok_or("years must be a positive integer")?,
        },
        Some(_) => return Err("expected {years}".into()),
    };
    if years == 0 || years > 1000 {
        return Err("years must be between 1 and 1000".into());
    }

    let span = years as i64 * 365 * 24 * 60 * 60;
    let offset = rng.gen_range(1..=span) * direction;
    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .ok_or("invalid reference date")?;
    let anchor = if direction > 0 {
        Utc.from_utc_datetime(&midnight) + Duration::days(1)
    } else {
        Utc.from_utc_datetime(&midnight)
    };
    let date = anchor + Duration::seconds(offset);
    text(date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn array_element(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::Array(items)) if !items.is_empty() => {
            Ok(items[rng.gen_range(0..items.len())].clone())
        }
        _ => Err("expected a non-empty array".into()),
    }
}

/// Length from `n` or `{length: n}`.
fn length_arg(args: &[Value], default: u64) -> Result<u64, String> {
    let length = match args.first() {
        None | Some(Value::Null) => Some(default),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::Object(o)) => match o.get("length") {
            None => Some(default),
            Some(v) => v.as_u64(),
        },
        Some(_) => None,
    };
    length
        .filter(|len| *len <= MAX_LENGTH)
        .ok_or_else(|| format!("length must be an integer between 0 and {}", MAX_LENGTH))
}

/// Bounds from `max` or `{min, max}`.
fn int_bounds(args: &[Value], default_min: i64, default_max: i64) -> Result<(i64, i64), String> {
    let (min, max) = match args.first() {
        None | Some(Value::Null) => (default_min, default_max),
        Some(Value::Number(n)) => (default_min, n.as_i64().ok_or("max must be an integer")?),
        Some(Value::Object(o)) => (
            int_field(o, "min")?.unwrap_or(default_min),
            int_field(o, "max")?.unwrap_or(default_max),
        ),
        Some(_) => return Err("expected a number or {min, max}".into()),
    };
    if max < min {
        return Err(format!("max must be >= min (min={}, max={})", min, max));
    }
    Ok((min, max))
}

fn int_field(o: &serde_json::Map<String, Value>, key: &str) -> Result<Option<i64>, String> {
    o.get(key)
        .map(|v| v.as_i64().ok_or(format!("{} must be an integer", key)))
        .transpose()
}

fn float_field(o: &serde_json::Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    o.get(key)
        .map(|v| v.as_f64().ok_or(format!("{} must be a number", key)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_lists_all_methods() {
        let names = methods();
        assert_eq!(names.len(), 30);
        assert!(names.contains(&"person.firstName"));
        assert!(names.contains(&"helpers.arrayElement"));
        assert!(is_known("string.uuid"));
        assert!(!is_known("person"));
        assert!(!is_known("nope.method"));
    }

    #[test]
    fn test_every_generator_works_without_args() {
        let mut faker = FakeGenerator::new(Some(1));
        for name in methods() {
            if name == "helpers.arrayElement" {
                continue;
            }
            let value = faker.call(name, &[]).unwrap();
            assert!(!value.is_null(), "{} produced null", name);
        }
    }

    #[test]
    fn test_seeded_generators_repeat() {
        let mut a = FakeGenerator::new(Some(123));
        let mut b = FakeGenerator::new(Some(123));
        for name in ["person.firstName", "internet.email", "string.uuid", "number.int"] {
            assert_eq!(a.call(name, &[]).unwrap(), b.call(name, &[]).unwrap());
        }
    }

    #[test]
    fn test_unknown_method() {
        let mut faker = FakeGenerator::new(None);
        let err = faker.call("person.nope", &[]).unwrap_err();
        assert!(matches!(err, RenderError::UnknownFakerMethod(_)));
    }

    #[test]
    fn test_string_lengths() {
        let mut faker = FakeGenerator::new(Some(7));
        let alpha = faker.call("string.alpha", &[json!(16)]).unwrap();
        let alpha = alpha.as_str().unwrap();
        assert_eq!(alpha.len(), 16);
        assert!(alpha.chars().all(|c| c.is_ascii_alphabetic()));

        let numeric = faker.call("string.numeric", &[json!({"length": 6})]).unwrap();
        assert!(numeric.as_str().unwrap().chars().all(|c| c.is_ascii_digit()));
        assert_eq!(numeric.as_str().unwrap().len(), 6);

        let err = faker.call("string.alpha", &[json!("sixteen")]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidFakerArgs { .. }));
    }

    #[test]
    fn test_number_int_bounds() {
        let mut faker = FakeGenerator::new(None);
        for _ in 0..200 {
            let n = faker.call("number.int", &[json!({"min": 5, "max": 9})]).unwrap();
            assert!((5..=9).contains(&n.as_i64().unwrap()));
        }
        let n = faker.call("number.int", &[json!(3)]).unwrap();
        assert!((0..=3).contains(&n.as_i64().unwrap()));

        let err = faker.call("number.int", &[json!({"min": 9, "max": 5})]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidFakerArgs { .. }));
    }

    #[test]
    fn test_number_float_fraction_digits() {
        let mut faker = FakeGenerator::new(Some(3));
        let n = faker
            .call("number.float", &[json!({"min": 1, "max": 2, "fractionDigits": 2})])
            .unwrap()
            .as_f64()
            .unwrap();
        assert!((1.0..=2.0).contains(&n));
        assert_eq!((n * 100.0).round() / 100.0, n);
    }

    #[test]
    fn test_array_element() {
        let mut faker = FakeGenerator::new(None);
        let value = faker.call("helpers.arrayElement", &[json!(["a", "b"])]).unwrap();
        assert!(value == json!("a") || value == json!("b"));
        assert!(faker.call("helpers.arrayElement", &[json!([])]).is_err());
    }

    #[test]
    fn test_lorem_words_count() {
        let mut faker = FakeGenerator::new(Some(11));
        let words = faker.call("lorem.words", &[json!(5)]).unwrap();
        assert_eq!(words.as_str().unwrap().split(' ').count(), 5);
    }

    #[test]
    fn test_dates_are_rfc3339() {
        let mut faker = FakeGenerator::new(Some(2));
        let past = faker.call("date.past", &[]).unwrap();
        let past = chrono::DateTime::parse_from_rfc3339(past.as_str().unwrap()).unwrap();
        assert!(past < Utc::now());

        let future = faker.call("date.future", &[json!({"years": 2})]).unwrap();
        let future = chrono::DateTime::parse_from_rfc3339(future.as_str().unwrap()).unwrap();
        assert!(future > Utc::now());
    }

    #[test]
    fn test_dates_stay_on_their_side_of_now() {
        for seed in 0..2000 {
            let mut faker = FakeGenerator::new(Some(seed));
            let now = Utc::now();

            let past = faker.call("date.past", &[json!({"years": 1})]).unwrap();
            let past = chrono::DateTime::parse_from_rfc3339(past.as_str().unwrap()).unwrap();
            assert!(past < now, "seed {seed}: {past} is not in the past");

            let future = faker.call("date.future", &[json!({"years": 1})]).unwrap();
            let future = chrono::DateTime::parse_from_rfc3339(future.as_str().unwrap()).unwrap();
            assert!(future > now, "seed {seed}: {future} is not in the future");
        }
    }

    #[test]
    fn test_seeded_dates_are_reproducible() {
        let a = FakeGenerator::new(Some(5)).call("date.future", &[]).unwrap();
        let b = FakeGenerator::new(Some(5)).call("date.future", &[]).unwrap();
        assert_eq!(a, b);
    }
}
