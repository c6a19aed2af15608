/// Edit distance between two strings, counted in chars so that currency
/// symbols and accented particulars cost one edit each.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let (short, long) = if s1.chars().count() <= s2.chars().count() {
        (s1, s2)
    } else {
        (s2, s1)
    };
    let short: Vec<char> = short.chars().collect();

    // row[j] holds the distance between the long prefix seen so far and short[..j].
    let mut row: Vec<usize> = (0..=short.len()).collect();
    for (i, lc) in long.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &sc) in short.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if lc == sc {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[short.len()]
}
