// src/utils/html.rs

/// Sanitizes user-supplied rich text with ammonia's whitelist: safe tags such
/// as <b> and <p> survive, <script>/<iframe> and event attributes do not.
///
/// <script> and <style> are dropped together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
