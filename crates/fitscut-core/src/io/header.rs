use fitsio_pure::header::{parse_card, Card};
use fitsio_pure::value::Value;
use fitsio_pure::CARD_SIZE;

use crate::error::{FitscutError, Result};

/// Ordered view over the parsed cards of one HDU, END excluded.
///
/// Cards keep their parsed value so the list can be carried along with a
/// cutout; lookups match the first card carrying a value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap cards as parsed by `fitsio_pure`, stopping at END.
    pub fn from_cards(cards: &[Card]) -> Self {
        let cards = cards.iter().take_while(|c| !c.is_end()).cloned().collect();
        Self { cards }
    }

    /// Parse and append one card image, padding it to 80 characters.
    pub fn push_card(&mut self, card: &str) -> Result<()> {
        let mut image = [b' '; CARD_SIZE];
        let bytes = card.as_bytes();
        let len = bytes.len().min(CARD_SIZE);
        image[..len].copy_from_slice(&bytes[..len]);
        let card = parse_card(&image)
            .map_err(|e| FitscutError::InvalidFits(format!("bad header card {card:?}: {e}")))?;
        self.cards.push(card);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.value(keyword).is_some()
    }

    pub fn get_str(&self, keyword: &str) -> Option<String> {
        match self.value(keyword)? {
            Value::String(s) => Some(s.trim_end().to_string()),
            _ => None,
        }
    }

    /// Numeric value; integers are promoted.
    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        match self.value(keyword)? {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        match self.value(keyword)? {
            Value::Integer(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn get_bool(&self, keyword: &str) -> Option<bool> {
        match self.value(keyword)? {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }

    fn value(&self, keyword: &str) -> Option<&Value> {
        self.cards
            .iter()
            .filter(|c| c.keyword_str().eq_ignore_ascii_case(keyword))
            .find_map(|c| c.value.as_ref())
    }
}
