use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// A point in time stored as nanoseconds since the unix epoch.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// Returns `None` for an impossible calendar date.
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Into::into)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// `yyyyMMdd`, used in generated file numbers.
    pub fn date_code(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }
    /// `yyyyMMddHHmmss`, used in seal numbers.
    pub fn second_code(&self) -> String {
        self.0.format("%Y%m%d%H%M%S").to_string()
    }
    /// `yyyyMMddHHmmssSSS`, used in signature file names.
    pub fn milli_code(&self) -> String {
        self.0.format("%Y%m%d%H%M%S%3f").to_string()
    }
    /// `<yyyy>/<MM>` partition used by the document store.
    pub fn month_partition(&self) -> String {
        format!("{:04}/{:02}", self.0.year(), self.0.month())
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone + Eq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// One page of a listing, `page_num` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: usize,
    pub page_num: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_num: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 10,
        }
    }
}

impl PageRequest {
    pub fn new(page_num: usize, page_size: usize) -> Self {
        Self {
            page_num: page_num.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let records = items
            .into_iter()
            .skip((self.page_num - 1) * self.page_size)
            .take(self.page_size)
            .collect();
        Page {
            records,
            total,
            page_num: self.page_num,
            page_size: self.page_size,
        }
    }
}
