//! Property-based checks for planning budgets and heading normalization

use docweave::generation::normalize_headings;
use docweave::generation::planner::budget;
use docweave::text::SectionToken;
use proptest::prelude::*;

#[test]
fn allocated_targets_sum_to_total_when_shares_clear_the_floor() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(1usize..8, 2_000usize..50_000),
            |(count, total)| {
                let sections: Vec<SectionToken> = (0..count)
                    .map(|i| SectionToken::h2(format!("第{}部分", i + 1)))
                    .collect();

                let planned = budget::allocate(&sections, total);
                prop_assert_eq!(planned.len(), sections.len());
                for section in &planned {
                    prop_assert!(section.min_chars <= section.max_chars);
                    prop_assert!(section.target_chars <= section.max_chars);
                }
                let sum: usize = planned.iter().map(|s| s.target_chars).sum();
                prop_assert_eq!(sum, total);
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn normalized_documents_have_exactly_one_title() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let heading = prop_oneof![Just("#"), Just("##"), Just("###"), Just("####")];

    runner
        .run(
            &proptest::collection::vec((heading, "[a-z]{3,8}"), 0..6),
            |lines| {
                let text = lines
                    .iter()
                    .map(|(hashes, title)| format!("{} {}\n\n正文内容。", hashes, title))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let out = normalize_headings(&text, "文档标题", &[]);
                let titles = out.lines().filter(|l| l.starts_with("# ")).count();
                prop_assert_eq!(titles, 1);
                prop_assert!(out.lines().all(|l| !l.starts_with("####")));
                Ok(())
            },
        )
        .unwrap();
}
