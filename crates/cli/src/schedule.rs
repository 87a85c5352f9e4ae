//! Weekly rotating query lists for scheduled runs.

use leadgen_core::SearchQuery;
use time::OffsetDateTime;

/// Five targets per weekday, Monday first.
pub const WEEKLY_SCHEDULE: [[(&str, &str); 5]; 7] = [
    [
        ("dental clinic", "Mumbai"),
        ("skin clinic", "Delhi"),
        ("physiotherapy", "Pune"),
        ("eye clinic", "Bangalore"),
        ("hair salon", "Chennai"),
    ],
    [
        ("wedding planner", "Kochi"),
        ("wedding photographer", "Jaipur"),
        ("wedding venue", "Hyderabad"),
        ("bridal makeup", "Chandigarh"),
        ("event management", "Ahmedabad"),
    ],
    [
        ("gym", "Mumbai"),
        ("yoga studio", "Delhi"),
        ("fitness center", "Lucknow"),
        ("crossfit", "Indore"),
        ("personal trainer", "Surat"),
    ],
    [
        ("ca firm", "Mumbai"),
        ("chartered accountant", "Delhi"),
        ("tax consultant", "Bangalore"),
        ("legal services", "Chennai"),
        ("financial advisor", "Hyderabad"),
    ],
    [
        ("interior designer", "Mumbai"),
        ("architect", "Delhi"),
        ("renovation contractor", "Bangalore"),
        ("vastu consultant", "Jaipur"),
        ("modular kitchen", "Pune"),
    ],
    [
        ("coaching institute", "Lucknow"),
        ("ias coaching", "Delhi"),
        ("neet coaching", "Chennai"),
        ("jee coaching", "Kota"),
        ("spoken english", "Patna"),
    ],
    [
        ("restaurant", "Kochi"),
        ("cafe", "Bangalore"),
        ("bakery", "Mumbai"),
        ("catering services", "Delhi"),
        ("cloud kitchen", "Hyderabad"),
    ],
];

pub const DAY_NAMES: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

/// Queries for `day` (0 = Monday). Out-of-range days use Monday's list.
pub fn queries_for(day: u8) -> Vec<SearchQuery> {
    let list = WEEKLY_SCHEDULE.get(usize::from(day)).unwrap_or(&WEEKLY_SCHEDULE[0]);
    list.iter().map(|&pair| SearchQuery::from(pair)).collect()
}

/// Today's weekday in local time, Mon=0.
///
/// Falls back to UTC when the local offset cannot be determined.
pub fn today() -> u8 {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.weekday().number_days_from_monday()
}

pub fn day_name(day: u8) -> &'static str {
    DAY_NAMES.get(usize::from(day)).copied().unwrap_or(DAY_NAMES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_day_has_five_queries() {
        for day in 0..7 {
            let queries = queries_for(day);
            assert_eq!(queries.len(), 5);
            assert!(queries.iter().all(|q| !q.business_type.is_empty() && !q.city.is_empty()));
        }
    }

    #[test]
    fn test_monday_and_sunday() {
        assert_eq!(queries_for(0)[0], SearchQuery::new("dental clinic", "Mumbai"));
        assert_eq!(queries_for(6)[4], SearchQuery::new("cloud kitchen", "Hyderabad"));
        assert_eq!(day_name(6), "Sunday");
    }

    #[test]
    fn test_out_of_range_day_uses_monday() {
        assert_eq!(queries_for(9), queries_for(0));
        assert_eq!(day_name(9), "Monday");
    }

    #[test]
    fn test_today_is_a_weekday_index() {
        assert!(today() < 7);
    }
}
