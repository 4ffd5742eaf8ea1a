// Copyright (C) 2022 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::str::FromStr;

pub(crate) fn init_logging() {
    let h = mylog::Builder::new()
        .set_format(
            ::std::env::var("MOONFIRE_FORMAT")
                .map_err(|_| ())
                .and_then(|s| mylog::Format::from_str(&s))
                .unwrap_or(mylog::Format::Google),
        )
        .set_spec(::std::env::var("MOONFIRE_LOG").as_deref().unwrap_or("info"))
        .build();
    let _ = h.install();
}

/// Like `assert_eq!` on byte slices, but on failure prints both sides as hex dumps.
macro_rules! assert_eq_hex {
    ($left:expr, $right:expr $(,)?) => {{
        let left: &[u8] = &$left[..];
        let right: &[u8] = &$right[..];
        if left != right {
            panic!(
                "assertion failed: left == right\nleft:\n{}\nright:\n{}",
                pretty_hex::pretty_hex(&left),
                pretty_hex::pretty_hex(&right),
            );
        }
    }};
}

pub(crate) use assert_eq_hex;
