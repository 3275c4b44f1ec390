// All LLM prompt constants for the recommendation feature, plus the
// deterministic prompt builder. Reuses fragments from llm_client::prompts.

use serde_json::{json, Value};

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::models::campaign::{CampaignBrief, InfluencerProfile};

/// Persona and ranking rules. `{json_only}` is filled from the shared fragment.
const RECOMMENDATION_SYSTEM_TEMPLATE: &str = "You are an expert influencer marketing strategist. \
    You match brands with the influencers most likely to deliver on a campaign brief. \
    Weigh niche alignment, audience and location fit, engagement quality, and whether the \
    price per post fits the budget. Prefer available influencers. \
    Only recommend influencers from the provided list and use their exact IDs. \
    Return between 3 and 5 recommendations when enough candidates exist, best match first. \
    {json_only}";

/// User prompt template. Replace `{campaign}` and `{influencers}` before sending.
const RECOMMENDATION_PROMPT_TEMPLATE: &str = r#"Find the best influencers for this campaign.

CAMPAIGN BRIEF
{campaign}

AVAILABLE INFLUENCERS
{influencers}

Return a JSON object with this EXACT schema (no extra fields):
{
  "recommendations": [
    {
      "influencerId": "<id from the list above>",
      "matchScore": 0-100,
      "reasons": ["short, specific reason", "..."],
      "contentStrategy": "one or two sentences on what this influencer should create"
    }
  ],
  "summary": "two or three sentences on the overall strategy"
}"#;

/// Summary returned without calling the provider when there is nobody to rank.
pub const NO_CANDIDATES_SUMMARY: &str =
    "No influencers are currently available to match against this campaign.";

pub fn system_prompt() -> String {
    RECOMMENDATION_SYSTEM_TEMPLATE.replace("{json_only}", JSON_ONLY_SYSTEM)
}

/// Builds the user prompt. Field order is fixed and numbers are rendered with
/// en-US grouping so identical input always yields an identical prompt.
pub fn build_user_prompt(brief: &CampaignBrief, candidates: &[InfluencerProfile]) -> String {
    let campaign = [
        format!("- Niche: {}", brief.niche),
        format!("- Company size: {}", brief.company_size),
        format!("- Budget: ${}", format_amount(brief.budget)),
        format!("- Target audience: {}", brief.target_audience),
        format!("- Location: {}", brief.location),
        format!("- Campaign type: {}", brief.campaign_type),
    ]
    .join("\n");

    let influencers = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| describe_candidate(i + 1, c))
        .collect::<Vec<_>>()
        .join("\n\n");

    RECOMMENDATION_PROMPT_TEMPLATE
        .replace("{campaign}", &campaign)
        .replace("{influencers}", &influencers)
}

fn describe_candidate(position: usize, c: &InfluencerProfile) -> String {
    format!(
        "{position}. {name} (ID: {id})\n   \
         - Niche: {niche}\n   \
         - Location: {location}\n   \
         - Followers: {followers}\n   \
         - Engagement rate: {engagement}%\n   \
         - Price per post: ${price}\n   \
         - Content categories: {categories}\n   \
         - Languages: {languages}\n   \
         - Available: {available}",
        name = c.name,
        id = c.id,
        niche = c.niche,
        location = c.location,
        followers = group_thousands(c.followers_count),
        engagement = format_rate(c.engagement_rate),
        price = format_amount(c.price_per_post),
        categories = list_or_none(&c.content_categories),
        languages = list_or_none(&c.languages),
        available = if c.is_available { "yes" } else { "no" },
    )
}

/// JSON schema handed to the provider's structured-output mode.
pub fn output_shape() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "recommendations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "influencerId": { "type": "STRING" },
                        "matchScore": { "type": "NUMBER" },
                        "reasons": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "contentStrategy": { "type": "STRING" }
                    },
                    "required": ["influencerId", "matchScore", "reasons", "contentStrategy"]
                }
            },
            "summary": { "type": "STRING" }
        },
        "required": ["recommendations", "summary"]
    })
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none listed".to_string()
    } else {
        items.join(", ")
    }
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Currency amount with grouping and at most two decimals: `2500.5` → `"2,500.5"`.
pub fn format_amount(amount: f64) -> String {
    if !amount.is_finite() {
        return "0".to_string();
    }
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    let frac = cents % 100;
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    match frac {
        0 => format!("{sign}{whole}"),
        f if f % 10 == 0 => format!("{sign}{whole}.{}", f / 10),
        f => format!("{sign}{whole}.{f:02}"),
    }
}

fn format_rate(rate: f64) -> String {
    let rendered = format!("{:.2}", rate);
    rendered
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
