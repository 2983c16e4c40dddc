//! Black-box tests exercising the container families end to end.

#[cfg(test)]
mod boundaries;
#[cfg(test)]
mod concurrent;
#[cfg(test)]
mod overflow;
#[cfg(test)]
mod persist_roundtrip;
#[cfg(test)]
mod scenarios;
