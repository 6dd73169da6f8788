//! Record deserialization from the wire format
//!
//! Consumes the token stream directly and builds a [`Record`] without an
//! intermediate generic tree. The only nested objects the model allows are
//! references, so an object-valued field always parses as a
//! [`StoreReference`].

use super::token::{Token, Tokenizer};
use shelf_core::{Error, Record, RecordId, Result, Scalar, StoreReference, Value};

/// Reserved key carrying the record id
pub const ID_KEY: &str = "@id";
/// Reserved key carrying the declared type-label id
pub const TYPE_KEY: &str = "@type";

/// Parse one record from its wire form
///
/// # Errors
/// Fails with `Error::Parse` naming the expected vs. found symbol on any
/// malformed input, including trailing garbage after the record.
pub fn read_record(input: &str) -> Result<Record> {
    let mut reader = RecordReader::new(input);
    let record = reader.parse_record()?;
    reader.expect_eof()?;
    Ok(record)
}

struct RecordReader<'a> {
    tokens: Tokenizer<'a>,
    peeked: Option<Token>,
}

impl<'a> RecordReader<'a> {
    fn new(input: &'a str) -> Self {
        RecordReader {
            tokens: Tokenizer::new(input),
            peeked: None,
        }
    }

    fn next(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(t) => Ok(t),
            None => self.tokens.next_token(),
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.tokens.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn unexpected(&self, expected: impl Into<String>, found: &Token) -> Error {
        Error::Parse {
            expected: expected.into(),
            found: found.describe(),
            offset: self.tokens.offset(),
        }
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        let got = self.next()?;
        if got == want {
            Ok(())
        } else {
            Err(self.unexpected(want.describe(), &got))
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        let got = self.next()?;
        if got == Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of input", &got))
        }
    }

    fn expect_key(&mut self) -> Result<String> {
        match self.next()? {
            Token::Str(key) => Ok(key),
            other => Err(self.unexpected("a field key", &other)),
        }
    }

    fn expect_integer(&mut self, what: &str) -> Result<i64> {
        match self.next()? {
            Token::Int(i) => Ok(i64::from(i)),
            Token::Long(l) => Ok(l),
            other => Err(self.unexpected(what, &other)),
        }
    }

    fn expect_record_id(&mut self) -> Result<RecordId> {
        let raw = self.expect_integer("a record id")?;
        RecordId::from_i64(raw).map_err(|_| Error::Parse {
            expected: "a positive record id".to_string(),
            found: format!("{raw}"),
            offset: self.tokens.offset(),
        })
    }

    fn parse_record(&mut self) -> Result<Record> {
        self.expect(Token::ObjectStart)?;
        let mut record = Record::new();

        if *self.peek()? == Token::ObjectEnd {
            self.next()?;
            return Ok(record);
        }

        loop {
            let key = self.expect_key()?;
            self.expect(Token::Colon)?;
            match key.as_str() {
                ID_KEY => {
                    let id = self.expect_record_id()?;
                    record.assign_id(id).map_err(|_| Error::Parse {
                        expected: "a single @id key".to_string(),
                        found: "a duplicate @id".to_string(),
                        offset: self.tokens.offset(),
                    })?;
                }
                TYPE_KEY => {
                    let label = self.expect_integer("a type-label id")?;
                    record.set_type_label(label);
                }
                _ => {
                    let value = self.parse_value()?;
                    record.put(key, value)?;
                }
            }
            match self.next()? {
                Token::Comma => {}
                Token::ObjectEnd => return Ok(record),
                other => return Err(self.unexpected("',' or '}'", &other)),
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.next()? {
            Token::Bool(b) => Ok(Value::Bool(b)),
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Long(l) => Ok(Value::Long(l)),
            Token::Double(d) => Ok(Value::Double(d)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::ObjectStart => Ok(Value::Reference(self.parse_reference_body()?)),
            Token::ArrayStart => self.parse_list(),
            other => Err(self.unexpected("a field value", &other)),
        }
    }

    // Caller has consumed the ObjectStart.
    fn parse_reference_body(&mut self) -> Result<StoreReference> {
        let mut repository: Option<String> = None;
        let mut bucket: Option<String> = None;
        let mut id: Option<RecordId> = None;

        loop {
            let key = self.expect_key()?;
            self.expect(Token::Colon)?;
            match key.as_str() {
                "repository" => match self.next()? {
                    Token::Str(s) => repository = Some(s),
                    other => return Err(self.unexpected("a repository name", &other)),
                },
                "bucket" => match self.next()? {
                    Token::Str(s) => bucket = Some(s),
                    other => return Err(self.unexpected("a bucket name", &other)),
                },
                "id" => id = Some(self.expect_record_id()?),
                other => {
                    return Err(Error::Parse {
                        expected: "'repository', 'bucket' or 'id'".to_string(),
                        found: format!("key {other:?}"),
                        offset: self.tokens.offset(),
                    })
                }
            }
            match self.next()? {
                Token::Comma => {}
                Token::ObjectEnd => break,
                other => return Err(self.unexpected("',' or '}'", &other)),
            }
        }

        match (repository, bucket, id) {
            (Some(repository), Some(bucket), Some(id)) => {
                Ok(StoreReference { repository, bucket, id })
            }
            _ => Err(Error::Parse {
                expected: "a reference with repository, bucket and id".to_string(),
                found: "an incomplete reference object".to_string(),
                offset: self.tokens.offset(),
            }),
        }
    }

    // Caller has consumed the ArrayStart. An empty array parses as an empty
    // scalar list; the element kind otherwise decides between the two list
    // forms.
    fn parse_list(&mut self) -> Result<Value> {
        if *self.peek()? == Token::ArrayEnd {
            self.next()?;
            return Ok(Value::Scalars(Vec::new()));
        }
        if *self.peek()? == Token::ObjectStart {
            let mut refs = Vec::new();
            loop {
                self.expect(Token::ObjectStart)?;
                refs.push(self.parse_reference_body()?);
                match self.next()? {
                    Token::Comma => {}
                    Token::ArrayEnd => return Ok(Value::References(refs)),
                    other => return Err(self.unexpected("',' or ']'", &other)),
                }
            }
        }
        let mut scalars = Vec::new();
        loop {
            match self.next()? {
                Token::Bool(b) => scalars.push(Scalar::Bool(b)),
                Token::Int(i) => scalars.push(Scalar::Int(i)),
                Token::Long(l) => scalars.push(Scalar::Long(l)),
                Token::Double(d) => scalars.push(Scalar::Double(d)),
                Token::Str(s) => scalars.push(Scalar::Str(s)),
                other => return Err(self.unexpected("a scalar list element", &other)),
            }
            match self.next()? {
                Token::Comma => {}
                Token::ArrayEnd => return Ok(Value::Scalars(scalars)),
                other => return Err(self.unexpected("',' or ']'", &other)),
            }
        }
    }
}
