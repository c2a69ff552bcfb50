//! Prompt assembly and the bridge to the completion model.

use std::sync::Arc;

use serde::Serialize;

use super::images::ImageBlobStore;
use super::models::RetrievedRecord;
use super::retriever::Retriever;
use crate::completion::{CompletionModel, Prompt};
use crate::error::Result;

const GROUNDING_INSTRUCTION: &str =
    "\n\nPlease answer the question based on the provided text and images.";
const NO_EVIDENCE_NOTE: &str = "No relevant excerpts or images were found.\n";

/// Build the multimodal prompt for `query` from ranked evidence.
///
/// Text records come first, in rank order, followed by every image record whose
/// payload is present in `images`. Image records without a payload are left out.
pub fn build_prompt(query: &str, records: &[RetrievedRecord], images: &ImageBlobStore) -> Prompt {
    let mut prompt = Prompt::new();
    prompt.push_text(format!("Question: {}\n\nContext:\n", query));

    let excerpts: Vec<String> = records
        .iter()
        .filter_map(|r| {
            r.fragment
                .text_content()
                .map(|text| format!("[Page {}]: {}", r.page(), text))
        })
        .collect();
    if !excerpts.is_empty() {
        prompt.push_text(format!("Text excerpts:\n{}\n", excerpts.join("\n\n")));
    }

    let mut attached = 0;
    for record in records {
        let Some(image_ref) = record.fragment.image_ref() else {
            continue;
        };
        match images.get(image_ref) {
            Some(blob) => {
                prompt.push_text(format!("\n[Image from page {}]:\n", record.page()));
                prompt.push_image(blob.mime.clone(), blob.data.clone());
                attached += 1;
            }
            None => log::debug!("No payload for image '{}'; omitting from prompt", image_ref),
        }
    }

    if excerpts.is_empty() && attached == 0 {
        prompt.push_text(NO_EVIDENCE_NOTE);
    }

    prompt.push_text(GROUNDING_INSTRUCTION);
    prompt
}

/// An answer with the evidence it was generated from.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Every retrieved record, including images left out of the prompt
    pub evidence: Vec<RetrievedRecord>,
}

/// Retrieves evidence, assembles the prompt, and asks the completion model once.
pub struct Generator {
    retriever: Retriever,
    completion: Arc<dyn CompletionModel>,
}

impl Generator {
    pub fn new(retriever: Retriever, completion: Arc<dyn CompletionModel>) -> Self {
        Self {
            retriever,
            completion,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn answer(&self, query: &str) -> Result<Answer> {
        self.answer_k(query, self.retriever.top_k())
    }

    pub fn answer_k(&self, query: &str, k: usize) -> Result<Answer> {
        let (evidence, images) = self.retriever.retrieve_with_images(query, k)?;
        let prompt = build_prompt(query, &evidence, &images);

        log::info!(
            "Asking {} with {} records ({} images attached)",
            self.completion.model_id(),
            evidence.len(),
            prompt.image_count()
        );
        let text = self.completion.complete(&prompt)?;
        Ok(Answer { text, evidence })
    }
}
