use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use strsim::{jaro_winkler, normalized_levenshtein};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;
use whatlang::{detect as detect_language, Lang};

use crate::models::Report;

// Blend weights for the three token/char metrics.
const WEIGHT_TFIDF: f64 = 0.45;
const WEIGHT_JACCARD: f64 = 0.25;
const WEIGHT_TRIGRAM: f64 = 0.30;

/// Below this many tokens the token metrics are too coarse to trust on
/// their own: similarity is blended with edit distance and damped, so two
/// one-word titles cannot claim full confidence.
const SHORT_TEXT_TOKENS: usize = 3;

/// Contribution when one side has no usable text at all: neither a match
/// signal nor a veto.
pub const NEUTRAL_TEXT_SCORE: f64 = 0.4;

const COLOR_BONUS: f64 = 0.1;
const COLOR_FUZZY_THRESHOLD: f64 = 0.84;

/// Reports in this category match against every category.
const CATEGORY_WILDCARD: &str = "other";

lazy_static! {
    static ref PUNCT_RE: Regex = Regex::new(r"[^\p{L}\p{N}\s]+").unwrap();

    static ref EN_STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "the", "and", "or", "but", "if", "then", "else", "when",
        "at", "from", "by", "for", "with", "about", "against", "between",
        "into", "through", "during", "before", "after", "above", "below",
        "to", "off", "over", "under", "again", "further", "once", "here",
        "there", "all", "any", "both", "each", "few", "more", "most",
        "other", "some", "such", "no", "nor", "not", "only", "own", "same",
        "so", "than", "too", "very", "s", "t", "can", "will", "just", "don",
        "should", "now", "is", "are", "was", "were", "be", "been", "being",
        "have", "has", "had", "having", "do", "does", "did", "doing", "it",
        "its", "they", "them", "their", "this", "that", "these", "those",
    ]
    .into_iter()
    .collect();

    // Already in post-normalization form (alef/teh marbuta/yeh folded).
    static ref AR_STOP_WORDS: HashSet<&'static str> = [
        "في", "من", "علي", "الي", "عن", "مع", "هذا", "هذه", "ذلك", "تلك",
        "الذي", "التي", "الذين", "ما", "ماذا", "كيف", "متي", "اين", "لماذا",
        "ان", "كان", "كانت", "يكون", "تكون", "هو", "هي", "هم", "نحن", "انا",
        "انت", "انتم", "و", "او", "ثم", "لكن", "بل", "حتي", "قد", "لقد",
        "سوف", "لن", "لم", "لا", "نعم", "كل", "بعض", "كلا", "بين", "فوق",
        "تحت", "امام", "خلف", "داخل", "خارج", "عند", "منذ", "اذا", "لو",
        "كانوا", "يكونوا", "هناك", "هنا",
    ]
    .into_iter()
    .collect();
}

const AR_PREFIXES: [&str; 6] = ["ال", "و", "ب", "ك", "ل", "ف"];
const AR_SUFFIXES: [&str; 11] = ["ات", "ين", "ون", "ان", "ها", "هم", "هن", "نا", "ه", "ي", "ك"];

fn fold_arabic_char(c: char) -> char {
    match c {
        'أ' | 'إ' | 'آ' => 'ا',
        'ة' => 'ه',
        'ى' => 'ي',
        _ => c,
    }
}

/// Case-fold, strip diacritics/punctuation, and fold Arabic letter variants
/// so the rest of the pipeline compares stable forms.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(fold_arabic_char)
        .collect();
    let lowered = stripped.to_lowercase();
    PUNCT_RE.replace_all(&lowered, " ").trim().to_string()
}

fn is_arabic_word(word: &str) -> bool {
    word.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// Light Arabic affix stripping, the counterpart of English stemming.
fn strip_arabic_affixes(word: &str) -> String {
    let mut chars: Vec<char> = word.chars().collect();

    for prefix in AR_PREFIXES {
        let plen = prefix.chars().count();
        if chars.len() > plen + 2 && chars.iter().take(plen).collect::<String>() == prefix {
            chars.drain(..plen);
            break;
        }
    }
    for suffix in AR_SUFFIXES {
        let slen = suffix.chars().count();
        if chars.len() > slen + 2
            && chars[chars.len() - slen..].iter().collect::<String>() == suffix
        {
            chars.truncate(chars.len() - slen);
            break;
        }
    }

    chars.into_iter().collect()
}

/// Normalized, stopword-free, stemmed tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    let lang = detect_language(&normalized).map(|info| info.lang());
    let en_stemmer = Stemmer::create(Algorithm::English);

    normalized
        .unicode_words()
        .filter(|w| !EN_STOP_WORDS.contains(*w) && !AR_STOP_WORDS.contains(*w))
        .map(|w| {
            if is_arabic_word(w) {
                strip_arabic_affixes(w)
            } else if lang == Some(Lang::Eng) || lang.is_none() {
                en_stemmer.stem(w).to_string()
            } else {
                w.to_string()
            }
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f64> {
    let mut tf: HashMap<&str, f64> = HashMap::new();
    if tokens.is_empty() {
        return tf;
    }
    for token in tokens {
        *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    let total = tokens.len() as f64;
    for value in tf.values_mut() {
        *value /= total;
    }
    tf
}

/// Two-document TF-IDF cosine similarity.
fn tfidf_cosine(tokens1: &[String], tokens2: &[String]) -> f64 {
    let tf1 = term_frequencies(tokens1);
    let tf2 = term_frequencies(tokens2);

    let vocabulary: HashSet<&str> = tf1.keys().chain(tf2.keys()).copied().collect();
    let mut dot = 0.0;
    let mut norm1 = 0.0;
    let mut norm2 = 0.0;

    for token in vocabulary {
        let df = tf1.contains_key(token) as u8 + tf2.contains_key(token) as u8;
        let idf = (2.0 / df as f64).ln() + 1.0;
        let v1 = tf1.get(token).copied().unwrap_or(0.0) * idf;
        let v2 = tf2.get(token).copied().unwrap_or(0.0) * idf;
        dot += v1 * v2;
        norm1 += v1 * v1;
        norm2 += v2 * v2;
    }

    if norm1 == 0.0 || norm2 == 0.0 {
        return 0.0;
    }
    dot / (norm1.sqrt() * norm2.sqrt())
}

fn token_jaccard(tokens1: &[String], tokens2: &[String]) -> f64 {
    let set1: HashSet<&str> = tokens1.iter().map(String::as_str).collect();
    let set2: HashSet<&str> = tokens2.iter().map(String::as_str).collect();
    let union = set1.union(&set2).count();
    if union == 0 {
        return 0.0;
    }
    set1.intersection(&set2).count() as f64 / union as f64
}

fn char_trigrams(normalized: &str) -> HashSet<String> {
    let chars: Vec<char> = normalized.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.len() < 3 {
        let mut grams = HashSet::new();
        if !chars.is_empty() {
            grams.insert(chars.iter().collect());
        }
        return grams;
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

fn trigram_similarity(normalized1: &str, normalized2: &str) -> f64 {
    let grams1 = char_trigrams(normalized1);
    let grams2 = char_trigrams(normalized2);
    let union = grams1.union(&grams2).count();
    if union == 0 {
        return 0.0;
    }
    grams1.intersection(&grams2).count() as f64 / union as f64
}

/// Confidence factor for short texts: one token cannot prove a match the way
/// a full description can.
fn short_text_confidence(token_count: usize) -> f64 {
    let n = token_count.min(SHORT_TEXT_TOKENS) as f64;
    0.7 + 0.3 * (n / SHORT_TEXT_TOKENS as f64)
}

/// Free-text similarity in [0,1]. Empty input scores 0; callers decide what
/// absence means (see `compare_attributes`).
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }

    let ta = tokenize(a);
    let tb = tokenize(b);
    let min_tokens = ta.len().min(tb.len());

    let blended = if na == nb {
        1.0
    } else {
        let mut score = WEIGHT_TFIDF * tfidf_cosine(&ta, &tb)
            + WEIGHT_JACCARD * token_jaccard(&ta, &tb)
            + WEIGHT_TRIGRAM * trigram_similarity(&na, &nb);
        if min_tokens < SHORT_TEXT_TOKENS {
            score = (score + normalized_levenshtein(&na, &nb)) / 2.0;
        }
        score
    };

    (blended * short_text_confidence(min_tokens)).clamp(0.0, 1.0)
}

/// Output of the attribute comparator: one text score plus the category flag
/// the aggregator turns into a score cap.
#[derive(Debug, Clone, Copy)]
pub struct AttributeScore {
    pub text_score: f64,
    pub category_match: bool,
}

/// Everything textual a report carries, folded into one comparable blob.
/// AI image captions land here, not in the visual signal.
fn text_blob(report: &Report) -> String {
    let mut parts = vec![report.title.clone(), report.description.clone()];
    if let Some(marks) = &report.distinguishing_marks {
        parts.push(marks.clone());
    }
    for image in &report.images {
        if let Some(caption) = &image.ai_description {
            parts.push(caption.clone());
        }
    }
    parts.join(" ")
}

fn categories_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a == b || a == CATEGORY_WILDCARD || b == CATEGORY_WILDCARD
}

/// Pairwise similarity of the structured and free-text attributes of two
/// reports. Never fails; missing fields contribute neutrally.
pub fn compare_attributes(a: &Report, b: &Report) -> AttributeScore {
    let blob_a = text_blob(a);
    let blob_b = text_blob(b);

    let mut text_score = if normalize(&blob_a).is_empty() || normalize(&blob_b).is_empty() {
        NEUTRAL_TEXT_SCORE
    } else {
        text_similarity(&blob_a, &blob_b)
    };

    // Matching colors add a bounded bonus; a missing color changes nothing.
    if let (Some(ca), Some(cb)) = (&a.color, &b.color) {
        let similarity = jaro_winkler(&normalize(ca), &normalize(cb));
        if similarity >= COLOR_FUZZY_THRESHOLD {
            text_score = (text_score + COLOR_BONUS * similarity).min(1.0);
        }
    }

    AttributeScore {
        text_score,
        category_match: categories_match(&a.category, &b.category),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReportImage, ReportKind, ReportStatus};

    fn report(title: &str, description: &str) -> Report {
        Report {
            id: "r".into(),
            short_id: 0,
            user_id: "u".into(),
            kind: ReportKind::Lost,
            title: title.into(),
            description: description.into(),
            category: "bags".into(),
            color: None,
            distinguishing_marks: None,
            city: None,
            address: None,
            latitude: None,
            longitude: None,
            occurred_on: "2025-01-01".into(),
            status: ReportStatus::Pending,
            images: Vec::new(),
        }
    }

    #[test]
    fn identical_descriptions_score_full() {
        let s = text_similarity(
            "black leather laptop bag with red zipper",
            "Black leather laptop bag, with red zipper!",
        );
        assert_eq!(s, 1.0);
    }

    #[test]
    fn single_word_match_is_damped() {
        // Two one-word titles must not claim full confidence.
        let s = text_similarity("wallet", "wallet");
        assert!(s < 1.0, "short text scored {}", s);
        assert!(s > 0.5);
    }

    #[test]
    fn unrelated_text_scores_low() {
        let s = text_similarity(
            "black leather laptop bag",
            "golden wedding ring engraved initials",
        );
        assert!(s < 0.25, "unrelated text scored {}", s);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "black leather bag lost near the mall";
        let b = "dark leather handbag found by the shopping mall";
        assert!((text_similarity(a, b) - text_similarity(b, a)).abs() < 1e-9);
    }

    #[test]
    fn empty_blob_is_neutral() {
        let a = report("", "");
        let b = report("black leather bag", "found near the station");
        let attrs = compare_attributes(&a, &b);
        assert_eq!(attrs.text_score, NEUTRAL_TEXT_SCORE);
    }

    #[test]
    fn color_bonus_is_bounded() {
        let mut a = report("black leather laptop bag", "left in a taxi downtown");
        let mut b = report("black leather laptop bag", "left in a taxi downtown");
        a.color = Some("Black".into());
        b.color = Some("black".into());

        let attrs = compare_attributes(&a, &b);
        assert!(attrs.text_score <= 1.0);

        // Different colors: no bonus, no penalty.
        b.color = Some("yellow".into());
        let without = compare_attributes(&a, &b);
        assert!(without.text_score <= attrs.text_score);
    }

    #[test]
    fn ai_captions_feed_the_text_blob() {
        let mut a = report("lost bag", "no details");
        let mut b = report("found bag", "no details");
        a.images.push(ReportImage {
            image_url: "a.jpg".into(),
            ai_description: Some("black leather laptop bag with red zipper".into()),
            fingerprint: None,
            histogram: None,
        });
        b.images.push(ReportImage {
            image_url: "b.jpg".into(),
            ai_description: Some("black leather laptop bag with red zipper".into()),
            fingerprint: None,
            histogram: None,
        });

        let with_captions = compare_attributes(&a, &b);
        a.images.clear();
        b.images.clear();
        let without = compare_attributes(&a, &b);
        assert!(with_captions.text_score > without.text_score);
    }

    #[test]
    fn arabic_text_matches_after_folding() {
        let s = text_similarity("حقيبة جلدية سوداء", "حقيبه جلديه سوداء");
        assert!(s > 0.8, "folded arabic scored {}", s);
    }

    #[test]
    fn category_wildcard() {
        assert!(categories_match("bags", "bags"));
        assert!(categories_match("other", "electronics"));
        assert!(!categories_match("bags", "electronics"));
    }
}
