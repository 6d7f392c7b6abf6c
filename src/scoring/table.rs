/// Points awarded for a single hit, keyed by the hit area the target reports
pub trait ScoringFunction: Send + Sync {
    fn score_for_hit_area(&self, hit_area: &str) -> i32;
}

impl<F> ScoringFunction for F
where
    F: Fn(&str) -> i32 + Send + Sync,
{
    fn score_for_hit_area(&self, hit_area: &str) -> i32 {
        self(hit_area)
    }
}

/// Standard hit-area table used by the targets' IPSC faces
#[derive(Debug, Clone, Copy, Default)]
pub struct IpscScoring;

impl ScoringFunction for IpscScoring {
    fn score_for_hit_area(&self, hit_area: &str) -> i32 {
        match hit_area.trim().to_lowercase().as_str() {
            "azone" => 5,
            "czone" => 3,
            "dzone" => 2,
            "miss" => -15,
            "whitezone" => -25,
            "blackzone" => -10,
            // paddle
            "circlearea" => 5,
            // popper
            "popperzone" => 5,
            _ => 0,
        }
    }
}
