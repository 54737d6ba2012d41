//! Synthetic documents for bulk loading.

use rand::seq::SliceRandom;
use rand::Rng;

const COMPANIES: &[&str] = &[
    "Acme Analytics", "Northwind Labs", "Blue Harbor Systems", "Quantum Ledger",
    "Greenfield Robotics", "Silverline Health", "Orbit Logistics", "Cobalt Energy",
];

const TOPICS: &[&str] = &[
    "supply chains", "vector search", "renewable energy", "patient records",
    "fraud detection", "edge computing", "retail forecasting", "satellite imagery",
    "language models", "payment networks", "urban planning", "crop yields",
];

const ACTIONS: &[&str] = &[
    "streamline", "reinvent", "monetize", "benchmark", "scale", "automate",
    "secure", "visualize", "consolidate", "accelerate",
];

const QUALITIES: &[&str] = &[
    "real-time", "distributed", "privacy-first", "low-latency", "end-to-end",
    "self-healing", "cross-platform", "data-driven", "open-source", "fault-tolerant",
];

const NOUNS: &[&str] = &[
    "pipelines", "dashboards", "platforms", "workflows", "architectures",
    "marketplaces", "sensors", "models", "networks", "portfolios",
];

const ROLES: &[&str] = &[
    "Data engineers", "Product managers", "Radiologists", "Logistics planners",
    "Security analysts", "Portfolio managers", "Agronomists", "City officials",
];

const FILLER: &[&str] = &[
    "the", "a", "new", "quarterly", "report", "team", "customers", "growth",
    "latency", "results", "pilot", "study", "market", "rollout", "budget",
    "regional", "survey", "feedback", "launch", "early", "adoption", "costs",
];

fn pick<'a, R: Rng>(rng: &mut R, words: &[&'a str]) -> &'a str {
    words.choose(rng).copied().unwrap_or_default()
}

fn sentence<R: Rng>(rng: &mut R) -> String {
    let len = rng.gen_range(8..18);
    let words: Vec<&str> = (0..len).map(|_| pick(rng, FILLER)).collect();
    let mut text = words.join(" ");
    if let Some(first) = text.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    text.push('.');
    text
}

fn paragraph<R: Rng>(rng: &mut R, sentences: usize) -> String {
    (0..sentences).map(|_| sentence(rng)).collect::<Vec<_>>().join(" ")
}

/// One document in a randomly chosen style.
pub fn document<R: Rng>(rng: &mut R) -> String {
    let sentences = rng.gen_range(1..5);
    match rng.gen_range(0..6) {
        0 => format!(
            "{} is working to {} {} {} for {}. {}",
            pick(rng, COMPANIES),
            pick(rng, ACTIONS),
            pick(rng, QUALITIES),
            pick(rng, NOUNS),
            pick(rng, TOPICS),
            paragraph(rng, 2),
        ),
        1 => format!(
            "Research shows that {} {} change how teams handle {}. {}",
            pick(rng, QUALITIES),
            pick(rng, NOUNS),
            pick(rng, TOPICS),
            paragraph(rng, sentences),
        ),
        2 => format!(
            "{} are increasingly focused on {} and {} {}. {}",
            pick(rng, ROLES),
            pick(rng, TOPICS),
            pick(rng, QUALITIES),
            pick(rng, NOUNS),
            sentence(rng),
        ),
        3 => format!(
            "Introducing {}: {} {} to {} {}. {}",
            pick(rng, COMPANIES),
            pick(rng, QUALITIES),
            pick(rng, NOUNS),
            pick(rng, ACTIONS),
            pick(rng, TOPICS),
            paragraph(rng, 2),
        ),
        4 => format!(
            "Have you heard about {}? {}",
            pick(rng, TOPICS),
            paragraph(rng, sentences + 1),
        ),
        _ => paragraph(rng, sentences + 1),
    }
}
