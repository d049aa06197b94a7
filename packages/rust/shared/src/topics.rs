//! Built-in topic profiles.
//!
//! Each profile is plain data; the classification pipeline is the same for
//! all of them. Config-file `[[topics]]` entries extend or replace these.

use crate::error::{OrgScanError, Result};
use crate::types::TopicProfile;

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| (*t).to_string()).collect()
}

/// Drone / satellite vegetation monitoring along utility rights-of-way.
pub fn vegetation() -> TopicProfile {
    TopicProfile {
        name: "vegetation".into(),
        description: "Drone or satellite based vegetation monitoring".into(),
        verdict_column: "Uses_Remote_Veg_Monitoring".into(),
        evidence_column: "Veg_Monitoring_Source_URL".into(),
        required_groups: vec![
            terms(&[
                "satellite",
                "overstory",
                "drone",
                "uav",
                "lidar",
                "aerial imagery",
                "artificial intelligence",
            ]),
            terms(&[
                "vegetation",
                "right-of-way",
                "rights-of-way",
                "tree trimming",
                "encroachment",
            ]),
        ],
        exclusions: terms(&[
            "satellite dish",
            "satellite internet",
            "satellite tv",
            "satellite office",
            "facebook.com",
            "ziprecruiter",
            "indeed.com",
            "glassdoor",
        ]),
    }
}

/// AI-enabled camera networks (wildfire / line monitoring).
pub fn aerial_camera() -> TopicProfile {
    TopicProfile {
        name: "aerial-camera".into(),
        description: "AI camera monitoring networks".into(),
        verdict_column: "Uses_AI_Cameras".into(),
        evidence_column: "AI_Camera_Source_URL".into(),
        required_groups: vec![terms(&[
            "pano ai",
            "panoai",
            "ai camera",
            "ai-enabled camera",
            "ai enabled camera",
            "ai-powered camera",
            "ai powered camera",
        ])],
        exclusions: terms(&[
            "panasonic",
            "distributech.com",
            "chartwellinc.com",
            "lobbylinx.com",
            "re-plus.com/see-whos-attending/",
        ]),
    }
}

/// Drones used for power line inspection.
pub fn drone_inspection() -> TopicProfile {
    TopicProfile {
        name: "drone-inspection".into(),
        description: "Drone or UAV power line inspection".into(),
        verdict_column: "Uses_Drones".into(),
        evidence_column: "Drone_Source_URL".into(),
        required_groups: vec![
            terms(&["uas", "uav", "drone", "unmanned aerial"]),
            terms(&[
                "power line",
                "transmission",
                "distribution line",
                "line inspection",
                "pole inspection",
                "utility inspection",
                "infrastructure inspection",
                "electrical grid",
            ]),
        ],
        exclusions: terms(&[
            "ziprecruiter",
            "facebook.com",
            "indeed.com",
            "glassdoor",
            "linkedin.com/jobs",
            "simplyhired",
            "dice.com",
            "/careers",
        ]),
    }
}

/// All built-in profiles, in display order.
pub fn builtin_topics() -> Vec<TopicProfile> {
    vec![vegetation(), aerial_camera(), drone_inspection()]
}

/// Merge config-declared topics over the built-ins (same name replaces).
pub fn all_topics(extra: &[TopicProfile]) -> Vec<TopicProfile> {
    let mut topics = builtin_topics();
    for topic in extra {
        match topics.iter_mut().find(|t| t.name == topic.name) {
            Some(existing) => *existing = topic.clone(),
            None => topics.push(topic.clone()),
        }
    }
    topics
}

/// Look up a topic by name and validate it.
pub fn find_topic(name: &str, extra: &[TopicProfile]) -> Result<TopicProfile> {
    let topics = all_topics(extra);
    let topic = topics
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
        .cloned()
        .ok_or_else(|| {
            let known: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
            OrgScanError::config(format!(
                "unknown topic '{name}' (known: {})",
                known.join(", ")
            ))
        })?;
    topic.validate()?;
    Ok(topic)
}
