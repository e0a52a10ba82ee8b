//! Prompt construction for the chart-of-accounts classifier.

use crate::models::{AccountCandidate, TransactionGroup};
use serde::Serialize;

/// Fixed system instruction, including the exact response contract.
pub const SYSTEM_PROMPT: &str = r#"<coa_categorization_prompt>
<instructions>
    <step>Identify the entity name from the transaction and infer what type of business it is.</step>
    <step>Determine the purpose of the transaction based on the entity and description.</step>
    <step>Assign a Chart of Accounts category based on UK GAAP standards.</step>
</instructions>
For each transaction, you must provide:
1. A brief thought process and explanation of which chart of account is appropriate for this transaction
2. The code for the most appropriate chart of account
3. A confidence score between 0 and 1 (e.g., 0.95 for high confidence, 0.40 for low confidence)

# IMPORTANT: Instructions for your response:
You must respond with valid JSON in the following format only:
{
  "classifications": [
    {
      "transaction_index": 0,
      "reasoning": "string",
      "account": "string",
      "confidence": float
    }
  ]
}
Return exactly one entry per transaction, using the transaction_index given in the input.
</coa_categorization_prompt>"#;

/// Static description of the business whose books are being reconciled.
///
/// Personnel names let the model separate director's loans, dividends and
/// payroll from ordinary supplier spend.
#[derive(Debug, Clone, Default)]
pub struct BusinessContext {
    pub company_name: String,
    pub company_description: String,
    pub directors: Vec<String>,
    pub shareholders: Vec<String>,
    pub employees: Vec<String>,
}

impl BusinessContext {
    pub fn new(company_name: impl Into<String>, company_description: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            company_description: company_description.into(),
            ..Default::default()
        }
    }

    pub fn with_personnel(
        mut self,
        directors: Vec<String>,
        shareholders: Vec<String>,
        employees: Vec<String>,
    ) -> Self {
        self.directors = directors;
        self.shareholders = shareholders;
        self.employees = employees;
        self
    }

    fn has_personnel(&self) -> bool {
        !(self.directors.is_empty() && self.shareholders.is_empty() && self.employees.is_empty())
    }

    fn render(&self) -> String {
        let mut out = format!(
            "<context>\n  <task>Analyze business transactions to assign appropriate Chart of Accounts code. Do so under UK GAAP</task>\n  <business_info>\n    <company_name>{}</company_name>\n    <description>{}</description>\n",
            self.company_name, self.company_description
        );
        if self.has_personnel() {
            out.push_str("    <personnel>\n");
            render_people(&mut out, "directors", "director", &self.directors);
            render_people(&mut out, "shareholders", "shareholder", &self.shareholders);
            render_people(&mut out, "employees", "employee", &self.employees);
            out.push_str("    </personnel>\n");
        }
        out.push_str("  </business_info>\n</context>");
        out
    }
}

fn render_people(out: &mut String, list_tag: &str, item_tag: &str, names: &[String]) {
    out.push_str(&format!("      <{list_tag}>\n"));
    for name in names {
        out.push_str(&format!("        <{item_tag}>{name}</{item_tag}>\n"));
    }
    out.push_str(&format!("      </{list_tag}>\n"));
}

/// A group representative as shown to the model.
#[derive(Debug, Serialize)]
struct PromptTransaction<'a> {
    transaction_index: usize,
    entity_name: &'a str,
    /// Major units, e.g. "-9.99".
    amount: String,
    currency: Option<&'a str>,
    remittance_info: Option<&'a str>,
    group_size: usize,
    enriched: bool,
    enriched_entity: Option<&'a str>,
    enriched_category: Option<&'a str>,
}

impl<'a> PromptTransaction<'a> {
    fn from_group(transaction_index: usize, group: &'a TransactionGroup) -> Self {
        let rep = &group.representative;
        let enrichment = rep.enrichment.as_ref();
        Self {
            transaction_index,
            entity_name: &rep.entity_name,
            amount: rep.major_amount().to_string(),
            currency: rep.currency.as_deref(),
            remittance_info: rep.remittance_info.as_deref(),
            group_size: group.size(),
            enriched: enrichment.is_some(),
            enriched_entity: enrichment.and_then(|e| e.entity.as_deref()),
            enriched_category: enrichment.and_then(|e| e.category.as_deref()),
        }
    }
}

/// Builds the user message for one batch. Groups are indexed from zero in
/// batch order; the response is expected to echo those indices.
pub fn build_user_prompt(
    context: &BusinessContext,
    groups: &[TransactionGroup],
    accounts: &[AccountCandidate],
) -> String {
    let transactions: Vec<PromptTransaction<'_>> = groups
        .iter()
        .enumerate()
        .map(|(index, group)| PromptTransaction::from_group(index, group))
        .collect();

    format!(
        "{}\n\nTransactions: {}\n\nchart of accounts: {}\n",
        context.render(),
        to_json(&transactions),
        to_json(&accounts)
    )
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to serialize prompt section");
        "[]".to_string()
    })
}
