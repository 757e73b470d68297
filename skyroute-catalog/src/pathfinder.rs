use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};

use skyroute_core::models::{Flight, FlightPath};

pub const DEFAULT_MAX_STOPS: usize = 3;

/// Bounded breadth-first search over the flight graph of one day: locations
/// are nodes, flights are directed edges.
#[derive(Debug, Clone, Copy)]
pub struct ItineraryPathFinder {
    connection_window: Duration,
    max_stops: usize,
}

impl Default for ItineraryPathFinder {
    fn default() -> Self {
        Self {
            connection_window: Duration::hours(4),
            max_stops: DEFAULT_MAX_STOPS,
        }
    }
}

impl ItineraryPathFinder {
    pub fn new(connection_window: Duration, max_stops: usize) -> Self {
        Self {
            connection_window,
            max_stops,
        }
    }

    /// Every itinerary from `source` to `destination` departing on `date`
    /// whose legs all satisfy `has_seats`. Results come out by stop count,
    /// direct flights first; within a stop count, by first departure.
    pub fn find_paths<F>(
        &self,
        flights: &[Flight],
        source: &str,
        destination: &str,
        date: NaiveDate,
        has_seats: F,
    ) -> Vec<FlightPath>
    where
        F: Fn(&Flight) -> bool,
    {
        if source == destination {
            return Vec::new();
        }

        let mut by_origin: HashMap<&str, Vec<&Flight>> = HashMap::new();
        for flight in flights
            .iter()
            .filter(|f| f.departure_date() == date && f.source != f.destination && has_seats(*f))
        {
            by_origin.entry(flight.source.as_str()).or_default().push(flight);
        }
        for legs in by_origin.values_mut() {
            legs.sort_by_key(|f| (f.departure_time, f.id));
        }

        let mut found = Vec::new();
        let mut seen: HashSet<Vec<i64>> = HashSet::new();

        let mut frontier: Vec<Vec<&Flight>> = by_origin
            .get(source)
            .map(|legs| legs.iter().map(|f| vec![*f]).collect())
            .unwrap_or_default();

        for _ in 0..=self.max_stops {
            let mut next = Vec::new();

            for partial in frontier {
                let Some(last) = partial.last() else { continue };

                if last.destination == destination {
                    let ids: Vec<i64> = partial.iter().map(|f| f.id).collect();
                    if seen.insert(ids) {
                        found.push(FlightPath::new(partial.into_iter().cloned().collect()));
                    }
                    continue;
                }

                let Some(onward) = by_origin.get(last.destination.as_str()) else {
                    continue;
                };
                for leg in onward {
                    if self.connects(last, leg) && !visits(&partial, source, &leg.destination) {
                        let mut extended = partial.clone();
                        extended.push(*leg);
                        next.push(extended);
                    }
                }
            }

            frontier = next;
        }

        found
    }

    fn connects(&self, arriving: &Flight, departing: &Flight) -> bool {
        let gap = departing.departure_time - arriving.arrival_time;
        gap > Duration::zero() && gap <= self.connection_window
    }
}

fn visits(path: &[&Flight], source: &str, location: &str) -> bool {
    location == source || path.iter().any(|f| f.destination == location)
}
