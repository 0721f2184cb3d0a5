use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::document::DocumentPayload;

const INSTRUCTION_HEAD: &str = "You are a chatbot that answers questions about a document.\n\n\
                                Use the following document to answer the question.\n\
                                Document: ";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("Question is empty")]
    EmptyQuestion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptPart {
    Text { text: String },
    Media { media_type: String, data: String },
}

impl PromptPart {
    fn text(text: impl Into<String>) -> Self {
        PromptPart::Text { text: text.into() }
    }
}

/// One outbound question: the instruction with the document embedded, plus
/// the JSON shape the answer must come back in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerRequest {
    pub parts: Vec<PromptPart>,
    pub question: String,
    pub output_schema: serde_json::Value,
}

impl AnswerRequest {
    /// The request as a single string, media parts shown by reference.
    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                PromptPart::Text { text } => text.clone(),
                PromptPart::Media { media_type, data } => {
                    format!("[{} attachment, {} base64 chars]", media_type, data.len())
                }
            })
            .collect()
    }
}

/// `{"answer": string}`
pub fn answer_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "answer": {
                "type": "string",
                "description": "The answer to the question about the document."
            }
        },
        "required": ["answer"]
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptComposer;

impl PromptComposer {
    /// The instruction wording is the same for both payload kinds; only the
    /// way the document is embedded differs. The question is kept verbatim.
    pub fn compose(
        &self,
        document: &DocumentPayload,
        question: &str,
    ) -> Result<AnswerRequest, PromptError> {
        if question.trim().is_empty() {
            return Err(PromptError::EmptyQuestion);
        }

        let tail = format!("\n\nQuestion: {}\n\nAnswer:", question);

        let parts = match document {
            DocumentPayload::Text { content } => {
                vec![PromptPart::text(format!("{}{}{}", INSTRUCTION_HEAD, content, tail))]
            }
            DocumentPayload::EncodedFile { media_type, data } => vec![
                PromptPart::text(INSTRUCTION_HEAD),
                PromptPart::Media {
                    media_type: media_type.clone(),
                    data: data.clone(),
                },
                PromptPart::text(tail),
            ],
        };

        Ok(AnswerRequest {
            parts,
            question: question.to_string(),
            output_schema: answer_schema(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_is_inlined_verbatim() {
        let document = DocumentPayload::text("Syllabus for Operating Systems, Semester 5...");
        let request = PromptComposer
            .compose(&document, "What is covered in Module 2?")
            .unwrap();

        assert_eq!(request.parts.len(), 1);
        let rendered = request.render();
        assert!(rendered.contains("Document: Syllabus for Operating Systems, Semester 5..."));
        assert!(rendered.contains("Question: What is covered in Module 2?"));
        assert!(rendered.ends_with("Answer:"));
        assert_eq!(request.question, "What is covered in Module 2?");
    }

    #[test]
    fn encoded_file_becomes_media_part_with_same_wording() {
        let text = PromptComposer
            .compose(&DocumentPayload::text("BODY"), "Why?")
            .unwrap();
        let file = PromptComposer
            .compose(&DocumentPayload::encode_file("application/pdf", b"%PDF"), "Why?")
            .unwrap();

        assert_eq!(file.parts.len(), 3);
        assert!(matches!(
            &file.parts[1],
            PromptPart::Media { media_type, data } if media_type == "application/pdf" && data == "JVBERg=="
        ));

        // Removing the embedded document leaves identical instructions.
        let text_wording = text.render().replace("BODY", "");
        let file_wording: String = file
            .parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text { text } => Some(text.as_str()),
                PromptPart::Media { .. } => None,
            })
            .collect();
        assert_eq!(text_wording, file_wording);
    }

    #[test]
    fn blank_question_is_rejected() {
        let document = DocumentPayload::text("anything");
        assert_eq!(PromptComposer.compose(&document, ""), Err(PromptError::EmptyQuestion));
        assert_eq!(
            PromptComposer.compose(&document, " \n\t "),
            Err(PromptError::EmptyQuestion)
        );
    }

    #[test]
    fn schema_requires_answer() {
        let request = PromptComposer
            .compose(&DocumentPayload::text("x"), "q")
            .unwrap();
        assert_eq!(request.output_schema["required"][0], "answer");
        assert_eq!(request.output_schema["properties"]["answer"]["type"], "string");
    }
}
