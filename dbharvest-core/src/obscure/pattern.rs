//! Obscuring pattern language.
//!
//! A pattern is literal text with embedded `[class]{range}` directives:
//!
//! | class            | produces                                            |
//! |------------------|-----------------------------------------------------|
//! | `a-z`            | lowercase pronounceable word                        |
//! | `A-Z`            | uppercase pronounceable word                        |
//! | `Title`, `A-z`   | capitalized pronounceable word                      |
//! | `0-9`            | digits, never `0`                                   |
//! | anything else    | the class text itself, repeated `end` times         |
//!
//! `range` is `start` or `start,end`. A length is `start`, or drawn from
//! `[start, end)` when `end` is given. A directive with `start == 0` first
//! flips a coin: on "stop" the value generated so far is returned (or NULL if
//! nothing was generated yet) and the rest of the pattern is discarded.
//!
//! ```rust
//! use dbharvest_core::obscure::Pattern;
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let pattern = Pattern::parse("[a-z]{5}@test.com");
//! let mut rng = StdRng::seed_from_u64(1);
//! let value = pattern.generate(&mut rng).unwrap();
//! assert!(value.ends_with("@test.com"));
//! assert_eq!(value.len(), 5 + "@test.com".len());
//! ```

use rand::{Rng, seq::SliceRandom};

use super::words::{fake_word, title_case};

/// Letter case applied to generated words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WordCase {
    /// `[a-z]`
    Lower,
    /// `[A-Z]`
    Upper,
    /// `[Title]` and mixed-case spellings such as `[A-z]`
    Title,
}

/// What a directive generates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DirectiveClass {
    /// Pronounceable fake word
    Word(WordCase),
    /// Non-zero digits
    Digits,
    /// Class text repeated verbatim
    Literal(String),
}

impl DirectiveClass {
    fn from_token(token: &str) -> Self {
        if token == "0-9" {
            return Self::Digits;
        }
        match token.to_ascii_lowercase().as_str() {
            "a-z" => Self::Word(match token {
                "a-z" => WordCase::Lower,
                "A-Z" => WordCase::Upper,
                _ => WordCase::Title,
            }),
            "title" => Self::Word(WordCase::Title),
            _ => Self::Literal(token.to_string()),
        }
    }
}

/// One `[class]{range}` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Directive {
    /// What to generate
    class: DirectiveClass,
    /// Fixed length, or lower bound when `end` is set
    start: usize,
    /// Exclusive upper bound; `None` when absent or unparseable
    end: Option<usize>,
}

impl Directive {
    /// Builds a directive, or `None` when `start` is not a number. Such a
    /// directive is left in the output as literal text.
    fn new(class: &str, range: &str) -> Option<Self> {
        let (start, end) = match range.split_once(',') {
            Some((start, end)) => (start, end.trim().parse().ok()),
            None => (range, None),
        };
        Some(Self {
            class: DirectiveClass::from_token(class),
            start: start.trim().parse().ok()?,
            end,
        })
    }

    /// Whether this directive may cut the value short.
    fn is_optional(&self) -> bool {
        self.start == 0
    }

    fn length<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        match self.end {
            Some(end) if end > self.start => rng.random_range(self.start..end),
            _ => self.start,
        }
    }

    fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match &self.class {
            DirectiveClass::Word(case) => {
                let word = fake_word(self.length(rng), rng);
                match case {
                    WordCase::Lower => word,
                    WordCase::Upper => word.to_uppercase(),
                    WordCase::Title => title_case(&word),
                }
            }
            DirectiveClass::Digits => digits(self.length(rng), rng),
            DirectiveClass::Literal(text) => text.repeat(self.end.unwrap_or(1).max(1)),
        }
    }
}

/// Draws digits from shuffled `0..=9` permutations, remapping `0` to `1..=8`
/// so the result never starts with (or contains) a placeholder zero.
fn digits<R: Rng + ?Sized>(length: usize, rng: &mut R) -> String {
    let mut out = String::with_capacity(length);
    while out.len() < length {
        let mut permutation: Vec<u8> = (0..10).collect();
        permutation.shuffle(rng);
        for digit in permutation.into_iter().take(length - out.len()) {
            let digit = if digit == 0 { rng.random_range(1..=8) } else { digit };
            out.push(char::from(b'0' + digit));
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    literal: String,
    directive: Directive,
}

/// A compiled obscuring pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
    suffix: String,
}

impl Pattern {
    /// Scans a pattern left to right into (literal, directive) pairs plus a
    /// trailing literal. Text that does not form a directive stays literal.
    pub fn parse(pattern: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal_start = 0;
        let mut cursor = 0;

        while let Some(offset) = pattern[cursor..].find('[') {
            let open = cursor + offset;
            match scan_directive(&pattern[open..]) {
                Some((len, class, range)) => {
                    if let Some(directive) = Directive::new(class, range) {
                        segments.push(Segment {
                            literal: pattern[literal_start..open].to_string(),
                            directive,
                        });
                        literal_start = open + len;
                    }
                    cursor = open + len;
                }
                None => cursor = open + 1,
            }
        }

        Self {
            segments,
            suffix: pattern[literal_start..].to_string(),
        }
    }

    #[cfg(test)]
    fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.segments.iter().map(|s| &s.directive)
    }

    /// Generates one replacement value; `None` means NULL.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let mut output = String::new();
        for segment in &self.segments {
            if segment.directive.is_optional() && rng.random_bool(0.5) {
                return if output.is_empty() { None } else { Some(output) };
            }
            output.push_str(&segment.literal);
            output.push_str(&segment.directive.render(rng));
        }
        output.push_str(&self.suffix);
        Some(output.trim().to_string())
    }
}

/// Matches `[class]{range}` at the start of `text` (which begins with `[`).
///
/// Neither `class` nor `range` may contain braces, and `class` ends at the
/// `]` immediately preceding the first `{`. Returns the matched byte length.
fn scan_directive(text: &str) -> Option<(usize, &str, &str)> {
    let brace = text[1..].find(['{', '}'])? + 1;
    if text.as_bytes()[brace] != b'{' || text.as_bytes()[brace - 1] != b']' || brace < 2 {
        return None;
    }
    let class = &text[1..brace - 1];

    let range_start = brace + 1;
    let close = text[range_start..].find(['{', '}'])? + range_start;
    if text.as_bytes()[close] != b'}' {
        return None;
    }
    Some((close + 1, class, &text[range_start..close]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_parse_literal_only() {
        let pattern = Pattern::parse("  plain text ");
        assert_eq!(pattern.directives().count(), 0);
        assert_eq!(pattern.generate(&mut rng(1)), Some("plain text".to_string()));
    }

    #[test]
    fn test_parse_directives() {
        let pattern = Pattern::parse("x[a-z]{5,10}@[0-9]{3}.com");
        let directives: Vec<_> = pattern.directives().collect();
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].class, DirectiveClass::Word(WordCase::Lower));
        assert_eq!(directives[0].start, 5);
        assert_eq!(directives[0].end, Some(10));
        assert_eq!(directives[1].class, DirectiveClass::Digits);
        assert_eq!(directives[1].end, None);
    }

    #[test]
    fn test_parse_classes() {
        let classes: Vec<_> = Pattern::parse("[A-Z]{1}[A-z]{1}[Title]{1}[-]{1}")
            .directives()
            .map(|d| d.class.clone())
            .collect();
        assert_eq!(
            classes,
            vec![
                DirectiveClass::Word(WordCase::Upper),
                DirectiveClass::Word(WordCase::Title),
                DirectiveClass::Word(WordCase::Title),
                DirectiveClass::Literal("-".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_numeric_start_stays_literal() {
        let pattern = Pattern::parse("a[a-z]{x}b");
        assert_eq!(pattern.directives().count(), 0);
        assert_eq!(pattern.generate(&mut rng(1)), Some("a[a-z]{x}b".to_string()));
    }

    #[test]
    fn test_unterminated_directive_stays_literal() {
        let pattern = Pattern::parse("[a-z{3}");
        assert_eq!(pattern.directives().count(), 0);
        assert_eq!(pattern.generate(&mut rng(1)), Some("[a-z{3}".to_string()));
    }

    #[test]
    fn test_email_pattern_shape() {
        let pattern = Pattern::parse("[a-z]{5}@test.com");
        let mut r = rng(42);
        for _ in 0..50 {
            let value = pattern.generate(&mut r).unwrap();
            let (local, domain) = value.split_once('@').unwrap();
            assert_eq!(domain, "test.com");
            assert_eq!(local.len(), 5);
            assert!(local.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_word_range_is_half_open() {
        let pattern = Pattern::parse("[A-Z]{2,4}");
        let mut r = rng(3);
        for _ in 0..200 {
            let value = pattern.generate(&mut r).unwrap();
            assert!((2..4).contains(&value.len()), "value: {}", value);
            assert!(value.chars().all(|c| c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_title_word() {
        let value = Pattern::parse("[Title]{6}").generate(&mut rng(5)).unwrap();
        let mut chars = value.chars();
        assert!(chars.next().unwrap().is_ascii_uppercase());
        assert!(chars.all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_literal_class_repeats() {
        assert_eq!(Pattern::parse("[ab]{1,3}").generate(&mut rng(1)), Some("ababab".to_string()));
        assert_eq!(Pattern::parse("[ab]{2}").generate(&mut rng(1)), Some("ab".to_string()));
        assert_eq!(Pattern::parse("[ab]{1,0}").generate(&mut rng(1)), Some("ab".to_string()));
    }

    #[test]
    fn test_three_digit_values() {
        let pattern = Pattern::parse("[0-9]{3}");
        let mut r = rng(99);
        for _ in 0..500 {
            let value = pattern.generate(&mut r).unwrap();
            assert_eq!(value.len(), 3);
            assert!(!value.starts_with('0'));
            let number: u32 = value.parse().unwrap();
            assert!((100..1000).contains(&number));
        }
    }

    #[test]
    fn test_long_digit_runs_keep_length() {
        let value = Pattern::parse("[0-9]{25}").generate(&mut rng(8)).unwrap();
        assert_eq!(value.len(), 25);
        assert!(value.chars().all(|c| ('1'..='9').contains(&c)));
    }

    #[test]
    fn test_optional_directive_yields_null_and_values() {
        let pattern = Pattern::parse("[0]{0}ABC[A-Z]{3}");
        let mut r = rng(2024);
        let draws: Vec<_> = (0..100).map(|_| pattern.generate(&mut r)).collect();

        assert!(draws.iter().any(Option::is_none));
        let present: Vec<_> = draws.iter().flatten().collect();
        assert!(!present.is_empty());
        for value in present {
            assert_eq!(value.len(), 7);
            assert!(value.starts_with("0ABC"));
        }
    }

    #[test]
    fn test_numeric_class_token_is_literal() {
        // `[0]` is a literal class; with start 1 it is never optional.
        let pattern = Pattern::parse("[0]{1}ABC[A-Z]{3}");
        let mut r = rng(5);
        for _ in 0..100 {
            let value = pattern.generate(&mut r).unwrap();
            assert!(value.starts_with("0ABC"));
        }
    }

    #[test]
    fn test_optional_stop_keeps_prefix_and_drops_rest() {
        let pattern = Pattern::parse("id-[0-9]{2}[x]{0}tail");
        let mut r = rng(17);
        let values: Vec<String> = (0..100).filter_map(|_| pattern.generate(&mut r)).collect();

        assert_eq!(values.len(), 100);
        assert!(values.iter().any(|v| v.len() == 5 && !v.ends_with("tail")));
        assert!(values.iter().any(|v| v.ends_with("xtail")));
    }

    proptest! {
        #[test]
        fn prop_digit_directives_have_exact_length(length in 1usize..40, seed in any::<u64>()) {
            let pattern = Pattern::parse(&format!("[0-9]{{{}}}", length));
            let value = pattern.generate(&mut rng(seed)).unwrap();
            prop_assert_eq!(value.len(), length);
            prop_assert!(value.bytes().all(|b| (b'1'..=b'9').contains(&b)));
        }

        #[test]
        fn prop_parse_never_panics(text in "\\PC{0,40}", seed in any::<u64>()) {
            let _ = Pattern::parse(&text).generate(&mut rng(seed));
        }
    }
}
