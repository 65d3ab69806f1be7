//! MIT license text for published repositories.

use chrono::{Datelike, Utc};

/// Render the MIT license with the current year and the given holder.
/// Every published repository gets this file regardless of round.
pub fn mit_license_text(holder: &str) -> String {
    mit_license_for_year(Utc::now().year(), holder)
}

fn mit_license_for_year(year: i32, holder: &str) -> String {
    format!(
        r#"MIT License

Copyright (c) {year} {holder}

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_license_carries_year_and_holder() {
        let text = mit_license_for_year(2026, "octocat");
        assert!(text.starts_with("MIT License"));
        assert!(text.contains("Copyright (c) 2026 octocat"));
    }

    #[test]
    fn test_license_uses_current_year() {
        let text = mit_license_text("octocat");
        assert!(text.contains(&Utc::now().year().to_string()));
    }
}
