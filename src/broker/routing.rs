//! Routing-key matching for topic exchanges.
//!
//! Keys and patterns are dot-separated words. In a pattern `*` matches
//! exactly one word and `#` matches zero or more words.

/// Returns true when `routing_key` matches the topic `pattern`.
///
/// Runs in `O(pattern words * key words)`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let mut pattern = words(pattern);
    // `#.#` matches exactly what `#` does.
    pattern.dedup_by(|a, b| *a == "#" && *b == "#");
    let key = words(routing_key);

    // matched[j]: the pattern prefix seen so far matches the first `j` key words.
    let mut matched = vec![false; key.len() + 1];
    matched[0] = true;
    for segment in &pattern {
        let mut next = vec![false; key.len() + 1];
        match *segment {
            "#" => {
                let mut reachable = false;
                for j in 0..=key.len() {
                    reachable |= matched[j];
                    next[j] = reachable;
                }
            }
            "*" => {
                for j in 1..=key.len() {
                    next[j] = matched[j - 1];
                }
            }
            word => {
                for j in 1..=key.len() {
                    next[j] = matched[j - 1] && key[j - 1] == word;
                }
            }
        }
        matched = next;
    }
    matched[key.len()]
}

fn words(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('.').collect()
    }
}
