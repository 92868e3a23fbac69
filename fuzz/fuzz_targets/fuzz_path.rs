// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fuzz target for lexical path cleaning and joining

#![no_main]

use fsb_core::path;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, &str)| {
    let (parent, name) = input;

    let cleaned = path::clean(parent);
    assert_eq!(path::clean(&cleaned), cleaned);
    assert!(!cleaned.is_empty());

    let joined = path::join(&cleaned, name);
    assert_eq!(path::clean(&joined), joined);

    let _ = path::base(&joined);
});
