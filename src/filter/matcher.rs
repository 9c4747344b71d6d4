/// Checks if a candidate matches a wildcard pattern
///
/// Supported wildcards:
/// - `*` matches any run of characters, including none
/// - `?` matches exactly one character
///
/// Every other character matches itself. Matching is case-sensitive and
/// anchored at both ends.
///
/// # Examples
///
/// ```
/// use crawl_collector::filter::matches_wildcard;
///
/// assert!(matches_wildcard("*.html", "docs/index.html"));
/// assert!(matches_wildcard("page?.txt", "page1.txt"));
/// assert!(!matches_wildcard("page?.txt", "page10.txt"));
/// assert!(!matches_wildcard("*.html", "index.htm"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    let (mut p, mut c) = (0, 0);
    // Position of the last '*' seen and the candidate index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some('?') => {
                p += 1;
                c += 1;
            }
            Some(&ch) if ch == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star, tried)) => {
                    p = star + 1;
                    c = tried + 1;
                    backtrack = Some((star, tried + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&ch| ch == '*')
}
