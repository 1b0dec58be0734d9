use std::collections::HashMap;

use crate::{
    models::NewUserAttributes,
    services::ann::normalize,
    services::model::ReferenceData,
};

/// Inferred affinity of a new user, aimed at one segment's index
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceVector {
    pub segment: String,
    pub values: Vec<f32>,
}

/// Component-wise mean of the vectors that exist; `None` when none do
fn mean<'a, I>(vectors: I, dimension: usize) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a Vec<f32>>,
{
    let mut sum = vec![0.0f32; dimension];
    let mut count = 0usize;
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for acc in sum.iter_mut() {
        *acc /= count as f32;
    }
    Some(sum)
}

fn lookup<'a>(table: &'a HashMap<String, Vec<f32>>, key: &str) -> Option<&'a Vec<f32>> {
    table.get(key)
}

/// Builds one preference vector per segment the user's followed categories touch
///
/// A demographic base (mean of the gender, birth decade and location priors
/// that exist) is shifted toward the mean of the followed categories each
/// segment covers. Segments are ordered by how many followed categories they
/// cover, then by their priority. With no overlap at all, a single vector
/// for the default segment uses every followed category instead.
///
/// The result depends only on the inputs: categories are visited in sorted
/// order and no state is kept between calls.
pub fn synthesize(attrs: &NewUserAttributes, reference: &ReferenceData) -> Vec<PreferenceVector> {
    let prefs = &reference.preferences;
    let dimension = reference.dimension();
    let decade = attrs.birth_decade();

    let demographic = [
        lookup(&prefs.gender, attrs.gender.code()),
        lookup(&prefs.birth_decade, &decade),
        lookup(&prefs.location, &attrs.location_id),
    ];
    let base: Vec<f32> = mean(demographic.into_iter().flatten(), dimension)
        .unwrap_or_else(|| vec![0.0; dimension])
        .into_iter()
        .map(|x| x * prefs.demographic_weight)
        .collect();

    let shifted = |interest: Option<Vec<f32>>| -> Vec<f32> {
        let mut v = base.clone();
        if let Some(interest) = interest {
            for (acc, x) in v.iter_mut().zip(interest) {
                *acc += prefs.interest_weight * x;
            }
        }
        normalize(&mut v);
        v
    };

    let mut matched: Vec<(usize, usize)> = reference
        .segments()
        .iter()
        .enumerate()
        .map(|(priority, segment)| {
            let overlap = attrs
                .followed_categories
                .iter()
                .filter(|c| segment.categories.contains(*c))
                .count();
            (priority, overlap)
        })
        .filter(|(_, overlap)| *overlap > 0)
        .collect();
    // Stable: equal overlap keeps priority order
    matched.sort_by(|a, b| b.1.cmp(&a.1));

    let vectors: Vec<PreferenceVector> = matched
        .into_iter()
        .map(|(priority, _)| {
            let segment = &reference.segments()[priority];
            let interest = mean(
                attrs
                    .followed_categories
                    .iter()
                    .filter(|c| segment.categories.contains(*c))
                    .filter_map(|c| prefs.category.get(c)),
                dimension,
            );
            PreferenceVector {
                segment: segment.name.clone(),
                values: shifted(interest),
            }
        })
        .collect();

    if !vectors.is_empty() {
        return vectors;
    }

    let interest = mean(
        attrs
            .followed_categories
            .iter()
            .filter_map(|c| prefs.category.get(c)),
        dimension,
    );
    vec![PreferenceVector {
        segment: reference.default_segment().name.clone(),
        values: shifted(interest),
    }]
}
