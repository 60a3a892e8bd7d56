pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Customer-support persona used when `[pipeline] template` is not set.
pub const DEFAULT_TEMPLATE: &str = "You are a highly skilled and empathetic customer support \
representative for Beem Company, the #1 Smart Wallet App that helps you stay on top of your \
finances. With Beem, you can get instant cash without interest and without credit checks through \
the Everdraft™. You can also send money online to anyone in the USA, file taxes for free, use a \
budget planner to plan, spend, and save money better, and avail credit monitoring and identity \
theft protection. Your goal is to provide short, friendly, and persuasive answers to customer \
questions, without being overly verbose. Focus on clarity and brevity while making the customer \
feel valued and supported. Always respond in a professional yet warm tone. Please structure your \
answer in 2 sentences, focusing on the most relevant points. Avoid unnecessary details. \n\n\
Here is the context you have about the product or service: {context} \n\n\
Customer's Question: {question} \n\n\
Your Answer (very short, concise, and friendly):";

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_owned(),
        }
    }
}

impl PromptTemplate {
    /// # Errors
    ///
    /// Returns [`PromptError::MissingPlaceholder`] unless the template contains
    /// both `{context}` and `{question}`.
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(PromptError::MissingPlaceholder(placeholder));
            }
        }
        Ok(Self { template })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both placeholders in one pass, so placeholder-like text in
    /// the context or question is left alone.
    #[must_use]
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_placeholders() {
        assert!(PromptTemplate::new(DEFAULT_TEMPLATE).is_ok());
        assert!(DEFAULT_TEMPLATE.starts_with("You are a highly skilled"));
        assert!(DEFAULT_TEMPLATE.ends_with("Your Answer (very short, concise, and friendly):"));
    }

    #[test]
    fn render_substitutes_both() {
        let t = PromptTemplate::new("C={context} Q={question}").unwrap();
        assert_eq!(t.render("ctx", "why?"), "C=ctx Q=why?");
    }

    #[test]
    fn render_default_embeds_context_and_question() {
        let prompt = PromptTemplate::default().render("Beem offers Everdraft.", "What is Beem?");
        assert!(prompt.contains(
            "Here is the context you have about the product or service: Beem offers Everdraft. \n\n"
        ));
        assert!(prompt.contains("Customer's Question: What is Beem? \n\n"));
    }

    #[test]
    fn render_with_empty_context() {
        let t = PromptTemplate::new("[{context}] {question}").unwrap();
        assert_eq!(t.render("", "hi"), "[] hi");
    }

    #[test]
    fn placeholders_in_values_are_not_expanded() {
        let t = PromptTemplate::new("{context}|{question}").unwrap();
        assert_eq!(t.render("{question}", "{context}"), "{question}|{context}");
    }

    #[test]
    fn other_braces_are_kept() {
        let t = PromptTemplate::new("{x} {context} {question} {").unwrap();
        assert_eq!(t.render("a", "b"), "{x} a b {");
    }

    #[test]
    fn missing_placeholder_rejected() {
        assert!(matches!(
            PromptTemplate::new("only {context}"),
            Err(PromptError::MissingPlaceholder("{question}"))
        ));
        assert!(matches!(
            PromptTemplate::new("only {question}"),
            Err(PromptError::MissingPlaceholder("{context}"))
        ));
    }
}
