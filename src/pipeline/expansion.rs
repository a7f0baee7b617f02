//! Query expansion — reformulates one question into several search queries
//! to widen retrieval recall.

use std::sync::Arc;

use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

pub struct QueryExpander {
    llm: Arc<dyn LlmProvider>,
    model: String,
    max_expansions: usize,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn LlmProvider>, model: String, max_expansions: usize) -> Self {
        Self {
            llm,
            model,
            max_expansions,
        }
    }

    /// Returns up to `max_expansions` reformulated queries, or an empty list
    /// when the model declines, errors, or produces output that does not
    /// validate. Empty means "fall back to single-query retrieval"; it is
    /// never surfaced as an error.
    pub async fn expand(&self, question: &str) -> Vec<String> {
        let prompt = expansion_prompt(question, self.max_expansions);
        let request = ChatRequest::deterministic(vec![ChatMessage::new("system", prompt)]);

        let response = match self.llm.chat(request, &self.model).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    "Query expansion failed, falling back to single-query retrieval: {}",
                    err
                );
                return Vec::new();
            }
        };

        let queries = parse_expansions(&response, self.max_expansions);
        if queries.is_empty() {
            tracing::warn!("Query expansion output did not validate, using fallback retrieval");
        }
        queries
    }
}

fn expansion_prompt(question: &str, count: usize) -> String {
    format!(
        "Your task is to generate {count} different search queries that aim to answer the user \
         question from multiple perspectives. Each query MUST tackle the question from a \
         different viewpoint, yet be unbiased. We want a variety of RELEVANT search results. \
         Provide the alternative queries separated by newlines, in the format shown between \
         the angled brackets, with no other text:\n\
         <\n\
         query 1\n\
         query 2\n\
         query 3\n\
         >\n\
         Original question: {question}"
    )
}

/// Tolerant parse of the expansion response. Delimiter lines and blank lines
/// are dropped, leading list markers are stripped, and the result is accepted
/// only when exactly `expected` well-formed lines remain.
fn parse_expansions(response: &str, expected: usize) -> Vec<String> {
    let queries: Vec<String> = response
        .lines()
        .map(|line| line.trim().trim_matches(|c| c == '<' || c == '>').trim())
        .filter(|line| !line.is_empty())
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .collect();

    if queries.len() == expected {
        queries
    } else {
        Vec::new()
    }
}

fn strip_list_marker(line: &str) -> String {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        // "1." / "2)" markers only; a query that merely starts with a
        // number ("1983 war causes") stays intact
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            return rest.trim_start().to_string();
        }
        return line.to_string();
    }

    if let Some(rest) = line.strip_prefix(['-', '*']) {
        return rest.trim_start().to_string();
    }

    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delimited_block() {
        let response = "<\nWhat started the conflict?\nWho were the main actors?\nWhen did fighting begin?\n>";
        let queries = parse_expansions(response, 3);
        assert_eq!(
            queries,
            vec![
                "What started the conflict?",
                "Who were the main actors?",
                "When did fighting begin?"
            ]
        );
    }

    #[test]
    fn strips_numbered_list_markers() {
        let response = "1. first query\n2) second query\n- third query";
        let queries = parse_expansions(response, 3);
        assert_eq!(queries, vec!["first query", "second query", "third query"]);
    }

    #[test]
    fn inline_delimiters_are_trimmed() {
        let response = "<first query\nsecond query\nthird query>";
        let queries = parse_expansions(response, 3);
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "first query");
        assert_eq!(queries[2], "third query");
    }

    #[test]
    fn leading_year_is_not_a_list_marker() {
        let response = "1983 riots background\nwar economy impact\ndiaspora perspective";
        let queries = parse_expansions(response, 3);
        assert_eq!(queries[0], "1983 riots background");
    }

    #[test]
    fn preamble_fails_validation() {
        let response = "Here are three queries:\nfirst\nsecond\nthird";
        assert!(parse_expansions(response, 3).is_empty());
    }

    #[test]
    fn too_few_lines_fail_validation() {
        assert!(parse_expansions("only one query", 3).is_empty());
        assert!(parse_expansions("", 3).is_empty());
        assert!(parse_expansions("<\n>\n", 3).is_empty());
    }
}
