use serde::{Deserialize, Serialize};

/// The brand-side description of a campaign, as submitted by the brief form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignBrief {
    pub niche: String,
    pub company_size: String,
    /// Total campaign budget in USD. Must be positive.
    pub budget: f64,
    pub target_audience: String,
    pub location: String,
    pub campaign_type: String,
}

/// A candidate influencer as listed in the marketplace catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencerProfile {
    pub id: String,
    pub name: String,
    pub niche: String,
    pub location: String,
    pub followers_count: u64,
    /// Percentage, e.g. `4.2` for 4.2%.
    pub engagement_rate: f64,
    pub price_per_post: f64,
    #[serde(default)]
    pub content_categories: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brief_deserializes_from_camel_case() {
        let json = r#"{
            "niche": "fitness",
            "companySize": "startup",
            "budget": 12500,
            "targetAudience": "women 25-34",
            "location": "Austin, TX",
            "campaignType": "product launch"
        }"#;
        let brief: CampaignBrief = serde_json::from_str(json).unwrap();
        assert_eq!(brief.company_size, "startup");
        assert_eq!(brief.target_audience, "women 25-34");
        assert!((brief.budget - 12500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_profile_optional_lists_default_empty() {
        let json = r#"{
            "id": "inf-1",
            "name": "Jess Moves",
            "niche": "fitness",
            "location": "Austin, TX",
            "followersCount": 48200,
            "engagementRate": 5.1,
            "pricePerPost": 750
        }"#;
        let profile: InfluencerProfile = serde_json::from_str(json).unwrap();
        assert!(profile.content_categories.is_empty());
        assert!(profile.languages.is_empty());
        assert!(profile.is_available);
        assert_eq!(profile.followers_count, 48_200);
    }
}
