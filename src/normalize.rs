//! Single-quote normalization.
//!
//! JSON produced by hand or by non-conforming writers often quotes strings with
//! `'`. [`normalize_quotes`] rewrites such input into strict JSON before it
//! reaches the tokenizer:
//!
//! ```
//! use ironjson::normalize::normalize_quotes;
//! use ironjson::DeviceBuffer;
//!
//! let input = DeviceBuffer::from_host(br#"{"A":'TEST"'}"#.to_vec());
//! let out = normalize_quotes(input, None);
//! assert_eq!(out.buffer.as_bytes(), br#"{"A":"TEST\""}"#);
//! ```
//!
//! The rewrite is a finite-state transducer driven by [`TRANSITIONS`], a table
//! indexed by state and input class. Each entry gives the next state and what
//! to emit. Strict JSON (no single-quoted strings) passes through unchanged.
//!
//! In JSON Lines input the record delimiter always returns the transducer to
//! [`QuoteState::OutsideString`], so a stray quote in one malformed record
//! cannot leak into the records after it. A raw newline is never valid inside
//! a JSON string, so well-formed records are unaffected.
//!
//! Unterminated strings are not an error here. The final state is returned in
//! [`Normalized::final_state`], records cut short by a delimiter are counted in
//! [`Normalized::unterminated_records`], and the tokenizer decides what to do
//! with the malformed record.

use crate::device::DeviceBuffer;
use tracing::{debug, warn};

/// Transducer states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteState {
    OutsideString,
    InDoubleQuote,
    InSingleQuote,
    EscapeInDouble,
    EscapeInSingle,
}

impl QuoteState {
    pub const ALL: [QuoteState; 5] = [
        QuoteState::OutsideString,
        QuoteState::InDoubleQuote,
        QuoteState::InSingleQuote,
        QuoteState::EscapeInDouble,
        QuoteState::EscapeInSingle,
    ];

    /// Whether the stream is inside a string literal in this state.
    #[must_use]
    pub fn in_string(self) -> bool {
        !matches!(self, QuoteState::OutsideString)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Byte classes the transducer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteClass {
    SingleQuote,
    DoubleQuote,
    Backslash,
    Other,
    /// The record delimiter of JSON Lines input.
    Delimiter,
}

impl ByteClass {
    pub const ALL: [ByteClass; 5] = [
        ByteClass::SingleQuote,
        ByteClass::DoubleQuote,
        ByteClass::Backslash,
        ByteClass::Other,
        ByteClass::Delimiter,
    ];

    /// Classify `byte`; `delimiter` is the record delimiter, if records have one.
    #[must_use]
    pub const fn of(byte: u8, delimiter: Option<u8>) -> ByteClass {
        if let Some(d) = delimiter {
            if byte == d {
                return ByteClass::Delimiter;
            }
        }
        match byte {
            b'\'' => ByteClass::SingleQuote,
            b'"' => ByteClass::DoubleQuote,
            b'\\' => ByteClass::Backslash,
            _ => ByteClass::Other,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// What a transition writes to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// The input byte.
    Verbatim,
    /// A `"` in place of the input byte.
    DoubleQuote,
    /// `\"` in place of the input byte.
    EscapedDoubleQuote,
    /// Nothing yet; the byte is a pending backslash.
    Defer,
    /// The pending backslash followed by the input byte.
    BackslashThenVerbatim,
}

/// One table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: QuoteState,
    pub emit: Emit,
}

const fn t(next: QuoteState, emit: Emit) -> Transition {
    Transition { next, emit }
}

use Emit as E;
use QuoteState as S;

/// `TRANSITIONS[state][class]`, rows in [`QuoteState::ALL`] order and columns in
/// [`ByteClass::ALL`] order.
pub const TRANSITIONS: [[Transition; 5]; 5] = [
    // OutsideString
    [
        t(S::InSingleQuote, E::DoubleQuote),
        t(S::InDoubleQuote, E::Verbatim),
        t(S::OutsideString, E::Verbatim),
        t(S::OutsideString, E::Verbatim),
        t(S::OutsideString, E::Verbatim),
    ],
    // InDoubleQuote
    [
        t(S::InDoubleQuote, E::Verbatim),
        t(S::OutsideString, E::Verbatim),
        t(S::EscapeInDouble, E::Verbatim),
        t(S::InDoubleQuote, E::Verbatim),
        t(S::OutsideString, E::Verbatim),
    ],
    // InSingleQuote
    [
        t(S::OutsideString, E::DoubleQuote),
        t(S::InSingleQuote, E::EscapedDoubleQuote),
        t(S::EscapeInSingle, E::Defer),
        t(S::InSingleQuote, E::Verbatim),
        t(S::OutsideString, E::Verbatim),
    ],
    // EscapeInDouble
    [
        t(S::InDoubleQuote, E::Verbatim),
        t(S::InDoubleQuote, E::Verbatim),
        t(S::InDoubleQuote, E::Verbatim),
        t(S::InDoubleQuote, E::Verbatim),
        t(S::OutsideString, E::Verbatim),
    ],
    // EscapeInSingle: `\'` is not a JSON escape, so it becomes a bare `'`.
    [
        t(S::InSingleQuote, E::Verbatim),
        t(S::InSingleQuote, E::BackslashThenVerbatim),
        t(S::InSingleQuote, E::BackslashThenVerbatim),
        t(S::InSingleQuote, E::BackslashThenVerbatim),
        t(S::OutsideString, E::BackslashThenVerbatim),
    ],
];

/// Look up the transition for `state` on a byte of `class`.
#[must_use]
pub const fn transition(state: QuoteState, class: ByteClass) -> Transition {
    TRANSITIONS[state.index()][class.index()]
}

/// Output of one transducer pass.
#[derive(Debug)]
pub struct Normalized {
    pub buffer: DeviceBuffer,
    /// State after the last input byte; anything but `OutsideString` means the
    /// input ended inside a string.
    pub final_state: QuoteState,
    /// Records whose delimiter arrived while still inside a string.
    pub unterminated_records: usize,
}

/// Run the transducer over `bytes`, appending to `out`.
///
/// With a `delimiter`, every occurrence of it resets the state to
/// [`QuoteState::OutsideString`]. Returns the final state and the number of
/// resets that happened inside a string.
pub fn transduce(
    bytes: &[u8],
    start: QuoteState,
    delimiter: Option<u8>,
    out: &mut DeviceBuffer,
) -> (QuoteState, usize) {
    let mut state = start;
    let mut unterminated = 0;
    for &byte in bytes {
        let class = ByteClass::of(byte, delimiter);
        if class == ByteClass::Delimiter && state.in_string() {
            unterminated += 1;
        }
        let step = transition(state, class);
        match step.emit {
            Emit::Verbatim => out.push(byte),
            Emit::DoubleQuote => out.push(b'"'),
            Emit::EscapedDoubleQuote => out.copy_from_host(b"\\\""),
            Emit::Defer => {}
            Emit::BackslashThenVerbatim => {
                out.push(b'\\');
                out.push(byte);
            }
        }
        state = step.next;
    }
    // A trailing lone backslash in single quotes has not been written yet.
    if state == QuoteState::EscapeInSingle {
        out.push(b'\\');
    }
    (state, unterminated)
}

/// Rewrite single-quoted strings in `input` into strict double-quoted JSON.
///
/// Consumes the ingested buffer and returns a new one; the output length can
/// differ from the input. Pass the record `delimiter` for JSON Lines input and
/// `None` for a whole document.
#[must_use]
pub fn normalize_quotes(input: DeviceBuffer, delimiter: Option<u8>) -> Normalized {
    let mut buffer = DeviceBuffer::with_capacity(input.len() + input.len() / 16);
    let (final_state, unterminated_records) =
        transduce(input.as_bytes(), QuoteState::OutsideString, delimiter, &mut buffer);
    debug!(
        input = input.len(),
        output = buffer.len(),
        "normalized quotes"
    );
    if unterminated_records > 0 {
        warn!(records = unterminated_records, "records end inside a string literal");
    }
    if final_state.in_string() {
        warn!(state = ?final_state, "input ends inside a string literal");
    }
    Normalized {
        buffer,
        final_state,
        unterminated_records,
    }
}
