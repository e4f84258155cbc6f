// Ratcliff/Obershelp sequence ratio: twice the recursively-matched character
// count over the combined length. Threshold behavior must track the matching
// blocks, not raw edit distance.

pub fn sequence_ratio(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();

    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let matched = matching_chars(&left, &right);
    2.0 * matched as f64 / (left.len() + right.len()) as f64
}

pub fn is_near_match(left: &str, right: &str, cutoff: f64) -> bool {
    sequence_ratio(left, right) >= cutoff
}

pub fn best_close_match<'a, I>(value: &str, choices: I, cutoff: f64) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for choice in choices {
        let ratio = sequence_ratio(value, choice);
        if ratio < cutoff {
            continue;
        }
        if best.map(|(_, best_ratio)| ratio > best_ratio).unwrap_or(true) {
            best = Some((choice, ratio));
        }
    }

    best.map(|(choice, _)| choice)
}

fn matching_chars(left: &[char], right: &[char]) -> usize {
    if left.is_empty() || right.is_empty() {
        return 0;
    }

    let (start_left, start_right, length) = longest_matching_block(left, right);
    if length == 0 {
        return 0;
    }

    length
        + matching_chars(&left[..start_left], &right[..start_right])
        + matching_chars(&left[start_left + length..], &right[start_right + length..])
}

fn longest_matching_block(left: &[char], right: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut run_lengths = vec![0_usize; right.len() + 1];

    for i in 0..left.len() {
        let mut next = vec![0_usize; right.len() + 1];
        for j in 0..right.len() {
            if left[i] == right[j] {
                let length = run_lengths[j] + 1;
                next[j + 1] = length;
                if length > best.2 {
                    best = (i + 1 - length, j + 1 - length, length);
                }
            }
        }
        run_lengths = next;
    }

    best
}
