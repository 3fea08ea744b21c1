//! Pronounceable fake words.

use rand::Rng;

const VOWELS: &[u8] = b"aeiou";
const CONSONANTS: &[u8] = b"bcdfghjklmnprstvwz";

/// Generates a lowercase word of exactly `length` letters alternating between
/// consonants and vowels, starting with either.
pub(crate) fn fake_word<R: Rng + ?Sized>(length: usize, rng: &mut R) -> String {
    let mut vowel_next = rng.random_bool(0.3);
    let mut word = String::with_capacity(length);
    for _ in 0..length {
        let letters = if vowel_next { VOWELS } else { CONSONANTS };
        word.push(char::from(letters[rng.random_range(0..letters.len())]));
        vowel_next = !vowel_next;
    }
    word
}

/// Uppercases the first letter of every whitespace-separated word.
pub(crate) fn title_case(text: &str) -> String {
    let mut titled = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            titled.extend(c.to_uppercase());
        } else {
            titled.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    titled
}
