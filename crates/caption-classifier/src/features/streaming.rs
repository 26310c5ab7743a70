//! Twenty-six feature configuration used for streaming-update similarity.
//!
//! Neighbourhoods here are chosen by centre distance normalized by the frame
//! size, so horizontal and vertical offsets weigh the same regardless of the
//! video aspect ratio.

use caption_types::{CaptionSpan, FeatureVector, FrameDims, OcrBox};

use super::neighborhood::{nearest, neighborhood_score};
use super::{FeatureError, FrameContext, aspect_ratio};

pub const STREAMING_FEATURE_COUNT: usize = 26;

const CHARSET_OFFSET: usize = 16;
const TEXT_LENGTH_SCALE: f64 = 100.0;
const DENSITY_SCALE: f64 = 50.0;
const NEUTRAL_TEMPORAL_POSITION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Latin,
    Digit,
    Punctuation,
    Cjk,
    Hangul,
    Other,
}

impl CharClass {
    const ALL: [CharClass; 6] = [
        CharClass::Latin,
        CharClass::Digit,
        CharClass::Punctuation,
        CharClass::Cjk,
        CharClass::Hangul,
        CharClass::Other,
    ];

    fn of(ch: char) -> Self {
        match ch {
            c if c.is_ascii_alphabetic() => CharClass::Latin,
            c if c.is_numeric() => CharClass::Digit,
            c if c.is_ascii_punctuation() => CharClass::Punctuation,
            '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FF0F}' => CharClass::Punctuation,
            '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{3040}'..='\u{30FF}' => {
                CharClass::Cjk
            }
            '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' => CharClass::Hangul,
            c if c.is_alphabetic() && (c as u32) < 0x0250 => CharClass::Latin,
            _ => CharClass::Other,
        }
    }

    fn index(self) -> usize {
        match self {
            CharClass::Latin => 0,
            CharClass::Digit => 1,
            CharClass::Punctuation => 2,
            CharClass::Cjk => 3,
            CharClass::Hangul => 4,
            CharClass::Other => 5,
        }
    }
}

/// Most frequent character class in `text`, ignoring whitespace.
///
/// Ties resolve in declaration order; empty text is `Other`.
pub fn dominant_char_class(text: &str) -> CharClass {
    let mut counts = [0usize; 6];
    for ch in text.chars().filter(|c| !c.is_whitespace()) {
        counts[CharClass::of(ch).index()] += 1;
    }
    let mut best = CharClass::Other;
    let mut best_count = 0usize;
    for class in CharClass::ALL {
        let count = counts[class.index()];
        if count > best_count {
            best = class;
            best_count = count;
        }
    }
    best
}

fn normalized_center_distance(dims: FrameDims) -> impl Fn(&OcrBox, &OcrBox) -> f64 {
    let width = dims.width as f64;
    let height = dims.height as f64;
    move |a: &OcrBox, b: &OcrBox| {
        let dx = (a.bounds.center_x() - b.bounds.center_x()) / width;
        let dy = (a.bounds.center_y() - b.bounds.center_y()) / height;
        (dx * dx + dy * dy).sqrt()
    }
}

fn temporal_position(frame_index: u64, span: Option<CaptionSpan>) -> f64 {
    let Some(span) = span else {
        return NEUTRAL_TEMPORAL_POSITION;
    };
    if span.end_frame <= span.start_frame {
        return NEUTRAL_TEMPORAL_POSITION;
    }
    let offset = frame_index.saturating_sub(span.start_frame) as f64;
    let length = (span.end_frame - span.start_frame) as f64;
    (offset / length).clamp(0.0, 1.0)
}

pub fn extract_streaming_features(
    target: &OcrBox,
    context: &FrameContext<'_>,
) -> Result<FeatureVector, FeatureError> {
    context.dims.validate()?;
    let width = context.dims.width as f64;
    let height = context.dims.height as f64;
    let bounds = &target.bounds;

    let neighbors = nearest(
        target,
        context.others(target),
        normalized_center_distance(context.dims),
    );
    let other_count = context.others(target).count();

    let mut values = Vec::with_capacity(STREAMING_FEATURE_COUNT);
    values.push(neighborhood_score(target, &neighbors, |b| b.bounds.top));
    values.push(neighborhood_score(target, &neighbors, |b| b.bounds.bottom));
    values.push(neighborhood_score(target, &neighbors, |b| b.bounds.height()));
    values.push(neighborhood_score(target, &neighbors, |b| b.bounds.center_x()));
    values.push(aspect_ratio(target));
    values.push(bounds.center_y() / height);
    values.push(bounds.center_x() / width);
    values.push(bounds.width() / width);
    values.push(bounds.height() / height);
    values.push(bounds.area() / context.dims.area());
    values.push(bounds.left / width);
    values.push(bounds.top / height);
    values.push(bounds.right / width);
    values.push(bounds.bottom / height);
    values.push((bounds.center_x() / width - 0.5).abs());
    values.push((target.text.chars().count() as f64 / TEXT_LENGTH_SCALE).min(1.0));

    let mut charset = [0.0; 6];
    charset[dominant_char_class(&target.text).index()] = 1.0;
    values.extend_from_slice(&charset);
    debug_assert_eq!(values.len(), CHARSET_OFFSET + charset.len());

    values.push((other_count as f64 / DENSITY_SCALE).min(1.0));
    values.push(temporal_position(target.id.frame_index, context.span));

    let (labeled_in, labeled_out) = context.label_flags(target.id);
    values.push(labeled_in);
    values.push(labeled_out);

    debug_assert_eq!(values.len(), STREAMING_FEATURE_COUNT);
    Ok(FeatureVector::new(values))
}
