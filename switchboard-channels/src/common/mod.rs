/// Split `content` into chunks of at most `max_len` characters.
///
/// Prefers to cut at the last line break inside the window, then at the last
/// space, and only cuts mid-word when neither exists. Whitespace at the start
/// of each following chunk is dropped.
pub fn split_message(content: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if content.chars().count() <= max_len {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = content;
    while !rest.is_empty() {
        // Byte offset just past the first max_len characters
        let Some((limit, _)) = rest.char_indices().nth(max_len) else {
            chunks.push(rest.to_string());
            break;
        };

        let window = &rest[..limit];
        let cut = window
            .rfind('\n')
            .filter(|&i| i > 0)
            .or_else(|| window.rfind(' ').filter(|&i| i > 0))
            .unwrap_or(limit);

        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start();
    }

    chunks
}
