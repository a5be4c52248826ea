//! Terminal output for published results.

use floorplan_client::{PublishedResult, Slot, Statistics, area_stats, count_stats};

pub fn print_published(slot: Slot, result: &PublishedResult) {
    match result {
        PublishedResult::Overlay(reference) => println!("{slot:<11} {reference}"),
        PublishedResult::Statistics(_) => println!("{slot:<11} ready"),
    }
}

pub fn print_statistics(statistics: &Statistics) {
    let counts = count_stats(statistics);
    if !counts.is_empty() {
        println!();
        println!("Elements");
        for (label, count) in &counts {
            println!("  {label:<10} {count:>8}");
        }
    }

    println!();
    println!("Areas");
    for (label, (start, end)) in &area_stats(statistics) {
        println!("  {label:<10} {:>8.2}  [{start:.2}, {end:.2}]", end - start);
    }
}
