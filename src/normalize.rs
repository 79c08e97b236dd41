//! Strip libtest boilerplate from a child's combined output.
//!
//! The child runs under libtest with the terse formatter, so a successful run
//! is framed by a `running 1 test` banner and, if the entry point ever
//! returns to libtest, a `test result: ok.` summary line.

/// Remove runner framing and surrounding whitespace. Idempotent.
pub fn normalize(output: &str) -> String {
    let mut current = output.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let mut body = text.trim();

    let (first, rest) = split_first_line(body);
    if is_run_banner(first) {
        body = rest.trim();
    }

    let (head, last) = split_last_line(body);
    if last.trim_start().starts_with("test result: ok.") {
        body = head.trim();
        // terse progress marker for the entry-point test
        let (head, last) = split_last_line(body);
        if last.trim() == "." {
            body = head.trim();
        }
    }

    body.to_string()
}

fn split_first_line(s: &str) -> (&str, &str) {
    match s.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (s, ""),
    }
}

fn split_last_line(s: &str) -> (&str, &str) {
    match s.rsplit_once('\n') {
        Some((head, last)) => (head, last),
        None => ("", s),
    }
}

/// `running 1 test` / `running 3 tests`.
fn is_run_banner(line: &str) -> bool {
    let Some(rest) = line.trim().strip_prefix("running ") else {
        return false;
    };
    let Some((count, word)) = rest.split_once(' ') else {
        return false;
    };
    !count.is_empty() && count.chars().all(|c| c.is_ascii_digit()) && matches!(word, "test" | "tests")
}
