// Nick matching for ignore and forward lists.
//
// Only `*` (any run, including empty) and `?` (exactly one char) are special.
// Matching is case-insensitive and only ever applied to nicknames.

/// Does `candidate` match the glob `pattern`?
pub fn matches(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let candidate: Vec<char> = candidate.chars().flat_map(char::to_lowercase).collect();

    let mut p = 0;
    let mut c = 0;
    // Position right after the last '*' and where in the candidate it started
    let mut star: Option<usize> = None;
    let mut star_c = 0;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_c = c;
            p += 1;
        } else if let Some(sp) = star {
            // Let the last '*' swallow one more character and retry
            p = sp + 1;
            star_c += 1;
            c = star_c;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}

/// Does any pattern in the list match?
pub fn matches_any<S: AsRef<str>>(patterns: &[S], candidate: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| matches(pattern.as_ref(), candidate))
}
