//! Folding of `S` status lines into a [`Card`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::{trace, warn};

use super::{Card, Sex};
use crate::proto::{escape, tlv, KdfCollection, ProtoError, ProtoResult};

const OPENPGP_SLOT_PREFIX: &str = "OPENPGP.";

/// A status line split into whitespace separated fields.
#[derive(Debug)]
pub(crate) struct StatusLine<'a> {
    line: &'a [u8],
    keyword: &'a str,
    fields: Vec<&'a [u8]>,
}

impl<'a> StatusLine<'a> {
    pub(crate) fn parse(line: &'a [u8]) -> ProtoResult<Self> {
        let line = line.trim_ascii();
        let mut fields = line
            .split(u8::is_ascii_whitespace)
            .filter(|field| !field.is_empty());

        let keyword = fields
            .next()
            .and_then(|keyword| std::str::from_utf8(keyword).ok())
            .ok_or_else(|| ProtoError::UnknownProperty {
                keyword: String::new(),
                line: String::from_utf8_lossy(line).into_owned(),
            })?;

        Ok(Self {
            line,
            keyword,
            fields: fields.collect(),
        })
    }

    pub(crate) fn keyword(&self) -> &'a str {
        self.keyword
    }

    fn illegal(&self) -> ProtoError {
        ProtoError::illegal_format(self.keyword)
    }

    /// Require exactly `count` fields after the keyword.
    pub(crate) fn expect_fields(&self, count: usize) -> ProtoResult<()> {
        if self.fields.len() == count {
            Ok(())
        } else {
            Err(self.illegal())
        }
    }

    fn raw(&self, index: usize) -> ProtoResult<&'a [u8]> {
        self.fields.get(index).copied().ok_or_else(|| self.illegal())
    }

    pub(crate) fn text(&self, index: usize) -> ProtoResult<&'a str> {
        std::str::from_utf8(self.raw(index)?).map_err(|_| self.illegal())
    }

    pub(crate) fn number<T>(&self, index: usize) -> ProtoResult<T>
    where
        T: FromStr<Err = std::num::ParseIntError>,
    {
        parse_number(self.keyword, self.text(index)?)
    }

    pub(crate) fn timestamp(&self, index: usize) -> ProtoResult<DateTime<Utc>> {
        let seconds = self.number(index)?;
        DateTime::from_timestamp(seconds, 0).ok_or_else(|| ProtoError::InvalidTimestamp {
            keyword: self.keyword.to_string(),
            seconds,
        })
    }

    fn unknown(&self) -> ProtoError {
        ProtoError::UnknownProperty {
            keyword: self.keyword.to_string(),
            line: String::from_utf8_lossy(self.line).into_owned(),
        }
    }
}

fn parse_number<T>(keyword: &str, text: &str) -> ProtoResult<T>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    text.parse().map_err(|source| ProtoError::InvalidNumber {
        keyword: keyword.to_string(),
        source,
    })
}

impl Card {
    /// Fold one status line (without the leading `S `) into the card.
    ///
    /// Lines are `KEYWORD field...`. Every known keyword has a fixed
    /// number of fields, except `READER` whose name may contain spaces.
    /// `PROGRESS` lines are accepted and ignored.
    ///
    /// On error the card may already have been partially updated.
    pub fn scan(&mut self, line: impl AsRef<[u8]>) -> ProtoResult<()> {
        let status = StatusLine::parse(line.as_ref())?;
        trace!("scanning {}", String::from_utf8_lossy(status.line));

        match status.keyword {
            "SIG-COUNTER" => {
                status.expect_fields(1)?;
                self.signature_counter = status.number(0)?;
            }
            "CHV-STATUS" => {
                status.expect_fields(1)?;
                let pieces: Vec<&str> = status.text(0)?.split('+').collect();
                let [_, cached, lengths @ .., r1, r2, r3] = pieces.as_slice() else {
                    return Err(status.illegal());
                };
                let [l1, l2, l3] = lengths else {
                    return Err(status.illegal());
                };
                self.signature_pin_cached = *cached == "1";
                for (slot, text) in [l1, l2, l3].into_iter().enumerate() {
                    self.max_pin_length[slot] = parse_number(status.keyword, text)?;
                }
                for (slot, text) in [r1, r2, r3].into_iter().enumerate() {
                    self.pin_retry_counter[slot] = parse_number(status.keyword, text)?;
                }
            }
            "KEY-TIME" => {
                status.expect_fields(2)?;
                let slot = status.number(0)?;
                let created = status.timestamp(1)?;
                self.ensure_key(slot)?.created = Some(created);
            }
            "KEY-FPR" => {
                status.expect_fields(2)?;
                let slot = status.number(0)?;
                let fingerprint = status.text(1)?;
                self.ensure_key(slot)?.fingerprint = Some(fingerprint.to_string());
            }
            "LOGIN-DATA" => self.login_data = single(&status)?,
            "DISP-LANG" => self.display_language = single(&status)?,
            "PUBKEY-URL" => self.public_key_url = single(&status)?,
            "EXTCAP" => self.ext_cap = single(&status)?,
            "APPTYPE" => self.app_type = single(&status)?,
            "SERIALNO" => self.serial = single(&status)?,
            "DISP-SEX" => {
                status.expect_fields(1)?;
                self.display_sex = Sex::from_code(status.text(0)?);
            }
            "DISP-NAME" => {
                status.expect_fields(1)?;
                self.display_name = status.text(0)?.replace(">>", " ").replace('>', " ");
            }
            "READER" => {
                if status.fields.is_empty() {
                    return Err(status.illegal());
                }
                let words = (0..status.fields.len())
                    .map(|index| status.text(index))
                    .collect::<ProtoResult<Vec<_>>>()?;
                self.reader = words.join(" ");
            }
            "KEYPAIRINFO" => {
                status.expect_fields(2)?;
                let keygrip = status.text(0)?;
                let slot = status
                    .text(1)?
                    .strip_prefix(OPENPGP_SLOT_PREFIX)
                    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                    .ok_or_else(|| status.illegal())?;
                let key = self.ensure_key(parse_number(status.keyword, slot)?)?;
                let known = key.keygrip.get_or_insert_with(|| keygrip.to_string());
                if *known != keygrip {
                    warn!("ignoring keygrip {keygrip} for slot {slot}, already known as {known}");
                }
            }
            "KDF" => {
                status.expect_fields(1)?;
                let blob = status.raw(0)?;
                let marker = status.line.len() - blob.len();
                let tags = tlv::read_tags(&escape::decode_with_plus(status.line), marker);
                self.kdf = Some(KdfCollection::from_tags(&tags)?);
            }
            "PROGRESS" => {}
            _ => return Err(status.unknown()),
        }

        Ok(())
    }
}

fn single(status: &StatusLine<'_>) -> ProtoResult<String> {
    status.expect_fields(1)?;
    Ok(status.text(0)?.to_string())
}
