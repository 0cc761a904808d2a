//! Serde helpers reading `null` as NaN, since JSON has no NaN literal.

use serde::{
    Deserialize,
    Deserializer,
};

fn fill(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

pub fn spectrum<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(fill(Vec::<Option<f64>>::deserialize(deserializer)?))
}

pub fn optional_spectrum<'de, D>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Option<f64>>>::deserialize(deserializer)?.map(fill))
}

pub fn spectra<'de, D>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Vec::<Vec<Option<f64>>>::deserialize(deserializer)?
        .into_iter()
        .map(fill)
        .collect())
}
