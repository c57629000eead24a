use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{AgentId, AgentRecord, NamePolicy, StoredRecord};

/// Keeps one record per agent and date, the one with the highest id.
pub fn dedupe_latest(records: Vec<StoredRecord>, policy: NamePolicy) -> Vec<StoredRecord> {
    let mut latest: HashMap<(AgentId, NaiveDate), StoredRecord> = HashMap::new();

    for stored in records {
        let key = (
            AgentId::new(&stored.record.agent_name, policy),
            stored.record.date,
        );
        match latest.get(&key) {
            Some(existing) if existing.id >= stored.id => {}
            _ => {
                latest.insert(key, stored);
            }
        }
    }

    let mut values: Vec<StoredRecord> = latest.into_values().collect();
    values.sort_by_key(|stored| stored.id);
    values
}

/// Drops agents whose name contains any hidden entry, ignoring case.
pub fn retain_visible(records: Vec<AgentRecord>, hidden_agents: &[String]) -> Vec<AgentRecord> {
    let hidden: Vec<String> = hidden_agents
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    if hidden.is_empty() {
        return records;
    }

    records
        .into_iter()
        .filter(|record| {
            let name = record.agent_name.to_lowercase();
            !hidden.iter().any(|excluded| name.contains(excluded.as_str()))
        })
        .collect()
}

// Chat time is weighted by chats and score by ratings; everything else sums.
// The result carries the latest date it covers.
pub fn aggregate_by_agent(records: &[AgentRecord], policy: NamePolicy) -> Vec<AgentRecord> {
    let mut order: Vec<AgentId> = Vec::new();
    let mut totals: HashMap<AgentId, AgentTotals> = HashMap::new();

    for record in records {
        let id = AgentId::new(&record.agent_name, policy);
        match totals.get_mut(&id) {
            Some(entry) => entry.add(record),
            None => {
                order.push(id.clone());
                totals.insert(id, AgentTotals::start(record));
            }
        }
    }

    let mut values: Vec<AgentRecord> = order
        .into_iter()
        .filter_map(|id| totals.remove(&id))
        .map(AgentTotals::finish)
        .collect();
    values.sort_by(|a, b| b.chats.cmp(&a.chats));
    values
}

struct AgentTotals {
    record: AgentRecord,
    merged: usize,
    chat_seconds_weighted: u128,
    score_weighted: f64,
}

impl AgentTotals {
    fn start(record: &AgentRecord) -> Self {
        Self {
            record: record.clone(),
            merged: 1,
            chat_seconds_weighted: weighted_seconds(record),
            score_weighted: record.avg_score * f64::from(record.rating_times),
        }
    }

    fn add(&mut self, other: &AgentRecord) {
        self.merged += 1;
        self.chat_seconds_weighted += weighted_seconds(other);
        self.score_weighted += other.avg_score * f64::from(other.rating_times);

        let total = &mut self.record;
        total.chats = total.chats.saturating_add(other.chats);
        total.total_chat_seconds = total
            .total_chat_seconds
            .saturating_add(other.total_chat_seconds);
        total.last_message_sent_count = total
            .last_message_sent_count
            .saturating_add(other.last_message_sent_count);
        total.rating_times = total.rating_times.saturating_add(other.rating_times);
        for (sum, count) in total.score_counts.iter_mut().zip(other.score_counts) {
            *sum = sum.saturating_add(count);
        }
        if other.date > total.date {
            total.date = other.date;
        }
    }

    fn finish(self) -> AgentRecord {
        let mut record = self.record;
        // A lone record passes through untouched, zero weights included.
        if self.merged == 1 {
            return record;
        }
        record.avg_chat_seconds = weighted_mean_seconds(self.chat_seconds_weighted, record.chats);
        record.avg_score = if record.rating_times > 0 {
            self.score_weighted / f64::from(record.rating_times)
        } else {
            0.0
        };
        record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSummary {
    pub agents: usize,
    pub chats: u64,
    pub rating_times: u64,
    pub avg_score: f64,
    pub avg_chat_seconds: u64,
    pub score_counts: [u64; 5],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub agents: usize,
    pub chats: u64,
    pub rating_times: u64,
    pub avg_score: f64,
    pub avg_chat_seconds: u64,
}

pub fn team_summary(records: &[AgentRecord]) -> TeamSummary {
    let mut totals = WeightedTotals::default();
    for record in records {
        totals.add(record);
    }

    TeamSummary {
        agents: totals.agents,
        chats: totals.chats,
        rating_times: totals.rating_times,
        avg_score: totals.avg_score(),
        avg_chat_seconds: totals.avg_chat_seconds(),
        score_counts: totals.score_counts,
    }
}

/// Per-date totals in ascending date order, weighted the same way as
/// `team_summary`. Expects deduplicated per-day records.
pub fn daily_trend(records: &[AgentRecord]) -> Vec<DailyTotals> {
    let mut days: BTreeMap<NaiveDate, WeightedTotals> = BTreeMap::new();
    for record in records {
        days.entry(record.date).or_default().add(record);
    }

    days.into_iter()
        .map(|(date, totals)| DailyTotals {
            date,
            agents: totals.agents,
            chats: totals.chats,
            rating_times: totals.rating_times,
            avg_score: totals.avg_score(),
            avg_chat_seconds: totals.avg_chat_seconds(),
        })
        .collect()
}

#[derive(Default)]
struct WeightedTotals {
    agents: usize,
    chats: u64,
    rating_times: u64,
    chat_seconds_weighted: u128,
    score_weighted: f64,
    score_counts: [u64; 5],
}

impl WeightedTotals {
    fn add(&mut self, record: &AgentRecord) {
        self.agents += 1;
        self.chats += u64::from(record.chats);
        self.rating_times += u64::from(record.rating_times);
        self.chat_seconds_weighted += weighted_seconds(record);
        self.score_weighted += record.avg_score * f64::from(record.rating_times);
        for (sum, count) in self.score_counts.iter_mut().zip(record.score_counts) {
            *sum += u64::from(count);
        }
    }

    fn avg_score(&self) -> f64 {
        if self.rating_times == 0 {
            0.0
        } else {
            self.score_weighted / self.rating_times as f64
        }
    }

    fn avg_chat_seconds(&self) -> u64 {
        if self.chats == 0 {
            return 0;
        }
        u64::try_from(self.chat_seconds_weighted / u128::from(self.chats)).unwrap_or(u64::MAX)
    }
}

fn weighted_seconds(record: &AgentRecord) -> u128 {
    u128::from(record.avg_chat_seconds) * u128::from(record.chats)
}

fn weighted_mean_seconds(weighted: u128, chats: u32) -> u64 {
    if chats == 0 {
        return 0;
    }
    u64::try_from(weighted / u128::from(chats)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, d).unwrap()
    }

    fn sample(
        name: &str,
        date: NaiveDate,
        chats: u32,
        avg_score: f64,
        rating_times: u32,
    ) -> AgentRecord {
        AgentRecord {
            chats,
            avg_score,
            rating_times,
            ..AgentRecord::new(name, date)
        }
    }

    fn stored(id: i64, record: AgentRecord) -> StoredRecord {
        StoredRecord {
            id,
            batch_id: Uuid::new_v4(),
            record,
        }
    }

    #[test]
    fn score_is_weighted_by_rating_count() {
        let records = vec![
            sample("Deniz", day(3), 10, 5.0, 10),
            sample("Deniz", day(4), 100, 1.0, 100),
        ];
        let aggregated = aggregate_by_agent(&records, NamePolicy::Exact);
        assert_eq!(aggregated.len(), 1);
        let expected = (5.0 * 10.0 + 1.0 * 100.0) / 110.0;
        assert!((aggregated[0].avg_score - expected).abs() < 1e-9);
        assert!((aggregated[0].avg_score - 3.0).abs() > 1.0);
        assert_eq!(aggregated[0].chats, 110);
        assert_eq!(aggregated[0].rating_times, 110);
    }

    #[test]
    fn chat_time_is_weighted_by_chats_and_totals_summed() {
        let mut first = sample("Deniz", day(3), 10, 0.0, 0);
        first.avg_chat_seconds = 60;
        first.total_chat_seconds = 600;
        first.last_message_sent_count = 4;
        first.score_counts = [1, 0, 0, 0, 2];
        let mut second = sample("Deniz", day(5), 30, 0.0, 0);
        second.avg_chat_seconds = 120;
        second.total_chat_seconds = 3_600;
        second.last_message_sent_count = 6;
        second.score_counts = [0, 1, 0, 0, 3];
        let mut third = sample("Deniz", day(4), 0, 0.0, 0);
        third.avg_chat_seconds = 9_999;

        let aggregated = aggregate_by_agent(&[first, second, third], NamePolicy::Exact);
        let deniz = &aggregated[0];
        assert_eq!(deniz.avg_chat_seconds, (600 + 3_600) / 40);
        assert_eq!(deniz.total_chat_seconds, 4_200);
        assert_eq!(deniz.last_message_sent_count, 10);
        assert_eq!(deniz.score_counts, [1, 1, 0, 0, 5]);
        assert_eq!(deniz.date, day(5));
        assert_eq!(deniz.avg_chat_time(), "1dk 45sn");
        assert_eq!(deniz.total_chat_time(), "1s 10dk 0sn");
    }

    #[test]
    fn zero_weights_yield_zero_averages() {
        let mut first = sample("Deniz", day(3), 0, 4.0, 0);
        first.avg_chat_seconds = 300;
        let second = sample("Deniz", day(4), 0, 5.0, 0);
        let aggregated = aggregate_by_agent(&[first, second], NamePolicy::Exact);
        assert_eq!(aggregated[0].avg_score, 0.0);
        assert_eq!(aggregated[0].avg_chat_seconds, 0);
        assert_eq!(aggregated[0].avg_chat_time(), "0dk 0sn");
    }

    #[test]
    fn single_record_passes_through() {
        let mut only = sample("Deniz", day(3), 0, 4.0, 0);
        only.avg_chat_seconds = 300;
        let aggregated = aggregate_by_agent(std::slice::from_ref(&only), NamePolicy::Exact);
        assert_eq!(aggregated, vec![only]);
    }

    #[test]
    fn agents_aggregate_separately_and_sort_by_chats() {
        let records = vec![
            sample("Deniz", day(3), 5, 4.0, 2),
            sample("Ece", day(3), 20, 5.0, 1),
            sample("Deniz", day(4), 5, 4.0, 2),
        ];
        let aggregated = aggregate_by_agent(&records, NamePolicy::Exact);
        let names: Vec<&str> = aggregated.iter().map(|r| r.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Ece", "Deniz"]);
        assert_eq!(aggregated[1].chats, 10);
    }

    #[test]
    fn dedupe_keeps_highest_identifier() {
        let records = vec![
            stored(9, sample("Deniz", day(3), 40, 4.0, 4)),
            stored(5, sample("Deniz", day(3), 10, 2.0, 1)),
            stored(6, sample("Deniz", day(4), 7, 3.0, 1)),
            stored(7, sample("Ece", day(3), 1, 5.0, 1)),
        ];
        let unique = dedupe_latest(records, NamePolicy::Exact);
        let ids: Vec<i64> = unique.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![6, 7, 9]);
        let deniz_day3 = unique.iter().find(|s| s.id == 9).unwrap();
        assert_eq!(deniz_day3.record.chats, 40);
    }

    #[test]
    fn dedupe_then_aggregate_counts_each_day_once() {
        let records = vec![
            stored(1, sample("Deniz", day(3), 10, 5.0, 10)),
            stored(2, sample("Deniz", day(3), 10, 5.0, 10)),
            stored(3, sample("Deniz", day(4), 100, 1.0, 100)),
        ];
        let unique: Vec<AgentRecord> = dedupe_latest(records, NamePolicy::Exact)
            .into_iter()
            .map(|s| s.record)
            .collect();
        let aggregated = aggregate_by_agent(&unique, NamePolicy::Exact);
        assert_eq!(aggregated[0].chats, 110);
    }

    #[test]
    fn hidden_agents_match_case_insensitive_substrings() {
        let records = vec![
            sample("Deniz Kaya", day(3), 1, 0.0, 0),
            sample("Ece Yilmaz", day(3), 1, 0.0, 0),
            sample("Test Bot", day(3), 1, 0.0, 0),
        ];
        let visible = retain_visible(records.clone(), &["kaya".to_string(), "BOT".to_string()]);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].agent_name, "Ece Yilmaz");

        let untouched = retain_visible(records, &["  ".to_string()]);
        assert_eq!(untouched.len(), 3);
    }

    #[test]
    fn team_summary_uses_weighted_means() {
        let mut first = sample("Deniz", day(3), 10, 5.0, 10);
        first.avg_chat_seconds = 60;
        first.score_counts = [0, 0, 0, 0, 10];
        let mut second = sample("Ece", day(3), 30, 1.0, 100);
        second.avg_chat_seconds = 120;
        second.score_counts = [100, 0, 0, 0, 0];

        let summary = team_summary(&[first, second]);
        assert_eq!(summary.agents, 2);
        assert_eq!(summary.chats, 40);
        assert_eq!(summary.rating_times, 110);
        assert_eq!(summary.avg_chat_seconds, 105);
        assert!((summary.avg_score - 150.0 / 110.0).abs() < 1e-9);
        assert_eq!(summary.score_counts, [100, 0, 0, 0, 10]);
    }

    #[test]
    fn empty_team_summary_is_zero() {
        let summary = team_summary(&[]);
        assert_eq!(summary.agents, 0);
        assert_eq!(summary.avg_score, 0.0);
        assert_eq!(summary.avg_chat_seconds, 0);
    }

    #[test]
    fn daily_trend_weights_each_date_separately() {
        let mut quiet = sample("Deniz", day(4), 10, 5.0, 10);
        quiet.avg_chat_seconds = 60;
        let mut busy = sample("Ece", day(4), 90, 1.0, 90);
        busy.avg_chat_seconds = 180;
        let mut next = sample("Deniz", day(5), 20, 4.0, 5);
        next.avg_chat_seconds = 300;

        let trend = daily_trend(&[next, quiet, busy]);
        assert_eq!(trend.len(), 2);

        assert_eq!(trend[0].date, day(4));
        assert_eq!(trend[0].agents, 2);
        assert_eq!(trend[0].chats, 100);
        assert_eq!(trend[0].rating_times, 100);
        assert!((trend[0].avg_score - 1.4).abs() < 1e-9);
        assert_eq!(trend[0].avg_chat_seconds, (600 + 16_200) / 100);

        assert_eq!(trend[1].date, day(5));
        assert_eq!(trend[1].chats, 20);
        assert!((trend[1].avg_score - 4.0).abs() < 1e-9);
        assert_eq!(trend[1].avg_chat_seconds, 300);
    }

    #[test]
    fn daily_trend_of_nothing_is_empty() {
        assert!(daily_trend(&[]).is_empty());
    }
}
