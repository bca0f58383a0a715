/// Turn `#[doc = "..."]` strings collected by the parser into text of `__doc__`
pub(crate) fn doc_text(comments: &[String]) -> Option<String> {
    if comments.is_empty() {
        return None;
    }
    let mut lines = Vec::with_capacity(comments.len());
    for comment in comments {
        if comment.contains('\n') {
            lines.extend(strip_block_decoration(comment));
        } else {
            lines.push(comment.clone());
        }
    }
    let indent = lines
        .iter()
        .filter(|x| !x.trim().is_empty())
        .map(|x| x.len() - x.trim_start().len())
        .min()
        .unwrap_or(0);
    let text = lines
        .iter()
        .map(|x| x.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim_matches('\n');
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Content of `/** ... */` without leading `*`
fn strip_block_decoration(comment: &str) -> Vec<String> {
    /// remove whitespace-only lines from the start/end of lines
    fn vertical_trim(lines: Vec<&str>) -> Vec<&str> {
        let mut i = 0;
        let mut j = lines.len();
        // first line of all-stars should be omitted
        if !lines.is_empty() && lines[0].chars().all(|c| c == '*') {
            i += 1;
        }
        while i < j && lines[i].trim().is_empty() {
            i += 1;
        }
        if j > i && lines[j - 1].trim().chars().all(|c| c == '*') {
            j -= 1;
        }
        while j > i && lines[j - 1].trim().is_empty() {
            j -= 1;
        }
        lines[i..j].to_vec()
    }

    /// remove a "[ \t]*\*" block from each line, if possible
    fn horizontal_trim(lines: Vec<&str>) -> Vec<String> {
        let mut star_pos = None;
        let can_trim = lines.iter().all(|line| {
            let pos = match line.find(|c: char| c != ' ' && c != '\t') {
                Some(pos) => pos,
                None => return true,
            };
            if !line[pos..].starts_with('*') {
                return false;
            }
            match star_pos {
                None => {
                    star_pos = Some(pos);
                    true
                }
                Some(prev) => prev == pos,
            }
        });
        match (can_trim, star_pos) {
            (true, Some(i)) => lines
                .iter()
                .map(|line| line.get(i + 1..).unwrap_or("").to_string())
                .collect(),
            _ => lines.iter().map(|x| x.to_string()).collect(),
        }
    }

    horizontal_trim(vertical_trim(comment.lines().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_doc_comments() {
        assert_eq!(None, doc_text(&[]));
        assert_eq!(
            Some("Record with one string\nfield".to_string()),
            doc_text(&[" Record with one string".into(), " field".into()])
        );
        assert_eq!(
            Some("a\n  indented".to_string()),
            doc_text(&[" a".into(), "   indented".into()])
        );
        assert_eq!(None, doc_text(&["".into(), "  ".into()]));
    }

    #[test]
    fn test_block_doc_comment() {
        let comment = "*\n * Test \n **  Test\n *   Test\n";
        assert_eq!(
            Some(" Test\n*  Test\n   Test".to_string()),
            doc_text(&[comment.into()])
        );
        let comment = "\n let a: *i32;\n *a = 5;\n";
        assert_eq!(
            Some("let a: *i32;\n*a = 5;".to_string()),
            doc_text(&[comment.into()])
        );
    }
}
