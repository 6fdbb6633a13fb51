//! Decoder of serialized PHP values, as sent in variable value responses.
//!
//! Grammar:
//! ```text
//! value  := 'N;' | 'i:' tok | 'd:' tok | 'b:' tok | 'r:' id ':' tok ':' tok
//!         | 's:' string | 'a:' len ':' members | 'O:' string len ':' members
//! string := len ':"' bytes '"' [';' | ':']
//! members:= '{' (key value)* '}' | '}' | <end>
//! key    := 'i:' tok | 's:' string
//! ```
//! A token ends with `;` or `:`.

use crate::connection::codec::TransferEncoding;
use crate::expression::{Container, DecodeError, Expression, ExpressionValue, Member};

/// Nesting limit for arrays and objects, deeper values are rejected.
pub const MAX_DEPTH: usize = 256;

/// Decode a serialized value.
///
/// With a `context` expression every member gets an addressable expression built from it,
/// without one members are named by their keys only. An empty blob decodes to
/// [`ExpressionValue::Null`].
pub fn decode(
    raw: &[u8],
    encoding: TransferEncoding,
    context: Option<&Expression>,
) -> Result<ExpressionValue, DecodeError> {
    if raw.is_empty() {
        return Ok(ExpressionValue::Null);
    }
    let mut decoder = Decoder {
        raw,
        pos: 0,
        depth: 0,
        encoding,
    };
    decoder.value(context)
}

struct Decoder<'a> {
    raw: &'a [u8],
    pos: usize,
    /// Number of arrays and objects being decoded.
    depth: usize,
    encoding: TransferEncoding,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Option<u8> {
        self.raw.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek().ok_or(DecodeError::UnexpectedEnd(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, expect: u8) -> Result<(), DecodeError> {
        let pos = self.pos;
        if self.next()? != expect {
            return Err(DecodeError::Expected {
                expect: expect as char,
                pos,
            });
        }
        Ok(())
    }

    /// Skip `b` if it is the next byte.
    fn skip(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            return true;
        }
        false
    }

    /// Read bytes up to a `;` or `:` delimiter (consumed) or the end of input.
    fn token(&mut self) -> &'a [u8] {
        let raw: &'a [u8] = self.raw;
        let start = self.pos;
        let end = raw[start..]
            .iter()
            .position(|&b| b == b';' || b == b':')
            .map(|offset| start + offset);
        match end {
            Some(end) => {
                self.pos = end + 1;
                &raw[start..end]
            }
            None => {
                self.pos = raw.len();
                &raw[start..]
            }
        }
    }

    fn text_token(&mut self) -> Result<String, DecodeError> {
        let pos = self.pos;
        let token = self.token();
        self.encoding
            .decode("token", token)
            .map_err(|_| DecodeError::InvalidText(pos))
    }

    fn len(&mut self) -> Result<usize, DecodeError> {
        let pos = self.pos;
        let token = self.token();
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| DecodeError::InvalidNumber {
                token: String::from_utf8_lossy(token).into_owned(),
                pos,
            })
    }

    /// Length prefixed, quoted string.
    fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.len()?;
        self.expect(b'"')?;
        let start = self.pos;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.raw.len())
            .ok_or(DecodeError::UnexpectedEnd(self.raw.len()))?;
        self.pos = end;
        self.expect(b'"')?;
        if !self.skip(b';') {
            self.skip(b':');
        }
        self.encoding
            .decode("string", &self.raw[start..end])
            .map_err(|_| DecodeError::InvalidText(start))
    }

    fn key(&mut self) -> Result<String, DecodeError> {
        let pos = self.pos;
        match self.next()? {
            b'i' => {
                self.expect(b':')?;
                self.text_token()
            }
            b's' => {
                self.expect(b':')?;
                self.string()
            }
            tag => Err(DecodeError::InvalidKey {
                tag: tag as char,
                pos,
            }),
        }
    }

    fn members(
        &mut self,
        declared_len: usize,
        context: Option<&Expression>,
        container: Container,
    ) -> Result<Vec<Member>, DecodeError> {
        match self.peek() {
            // engine sent the header only
            None => return Ok(vec![]),
            Some(b'}') => {
                self.pos += 1;
                return Ok(vec![]);
            }
            _ => self.expect(b'{')?,
        }

        // every member takes at least 4 bytes
        let mut children = Vec::with_capacity(declared_len.min((self.raw.len() - self.pos) / 4));
        while children.len() < declared_len {
            match self.peek() {
                None => return Err(DecodeError::UnexpectedEnd(self.pos)),
                Some(b'}') => break,
                _ => {}
            }

            let key = self.key()?;
            let expression = match context {
                Some(ctx) => ctx.create_child(&key, container),
                None => Expression::detached(key),
            };
            let value = self.value(context.map(|_| &expression))?;
            children.push(Member { expression, value });
        }
        self.skip(b'}');
        Ok(children)
    }

    fn nested<T>(
        &mut self,
        pos: usize,
        f: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        if self.depth == MAX_DEPTH {
            return Err(DecodeError::TooDeep { pos });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn value(&mut self, context: Option<&Expression>) -> Result<ExpressionValue, DecodeError> {
        let pos = self.pos;
        let tag = self.next()?;
        if tag == b'N' {
            self.skip(b';');
            return Ok(ExpressionValue::Null);
        }
        self.expect(b':')?;

        let value = match tag {
            b'i' => ExpressionValue::Int(self.text_token()?),
            b'd' => ExpressionValue::Float(self.text_token()?),
            b'b' => ExpressionValue::Bool(self.text_token()?),
            b'r' => {
                let id = self.text_token()?;
                // reserved
                self.token();
                ExpressionValue::Resource {
                    id,
                    value: self.text_token()?,
                }
            }
            b's' => ExpressionValue::String(self.string()?),
            b'a' => {
                let declared_len = self.len()?;
                let children =
                    self.nested(pos, |d| d.members(declared_len, context, Container::Array))?;
                ExpressionValue::Array {
                    declared_len,
                    children,
                }
            }
            b'O' => {
                let class_name = self.string()?;
                let declared_len = self.len()?;
                let children =
                    self.nested(pos, |d| d.members(declared_len, context, Container::Object))?;
                ExpressionValue::Object {
                    class_name,
                    declared_len,
                    children,
                }
            }
            tag => {
                return Err(DecodeError::UnknownType {
                    tag: tag as char,
                    pos,
                })
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expression::ExpressionKind;

    fn decode_str(raw: &str) -> Result<ExpressionValue, DecodeError> {
        decode(raw.as_bytes(), TransferEncoding::Utf8, None)
    }

    #[test]
    fn test_decode_array() {
        let value = decode_str(r#"a:2:{i:0;i:5;i:1;s:3:"abc";}"#).unwrap();
        let ExpressionValue::Array {
            declared_len,
            children,
        } = value
        else {
            panic!("array expected");
        };
        assert_eq!(declared_len, 2);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].expression.name(), "0");
        assert_eq!(children[0].value, ExpressionValue::Int("5".into()));
        assert_eq!(children[1].expression.name(), "1");
        assert_eq!(children[1].value, ExpressionValue::String("abc".into()));
    }

    #[test]
    fn test_decode_scalars() {
        struct TestCase {
            raw: &'static str,
            expect: ExpressionValue,
        }
        let test_cases = [
            TestCase {
                raw: "i:-42;",
                expect: ExpressionValue::Int("-42".into()),
            },
            TestCase {
                raw: "d:1.5;",
                expect: ExpressionValue::Float("1.5".into()),
            },
            TestCase {
                raw: "b:1;",
                expect: ExpressionValue::Bool("1".into()),
            },
            TestCase {
                raw: "N;",
                expect: ExpressionValue::Null,
            },
            TestCase {
                raw: "",
                expect: ExpressionValue::Null,
            },
            TestCase {
                raw: r#"s:0:"";"#,
                expect: ExpressionValue::String("".into()),
            },
            TestCase {
                // quotes and delimiters inside a string are data
                raw: r#"s:5:"a;b:"";"#,
                expect: ExpressionValue::String("a;b:\"".into()),
            },
            TestCase {
                raw: "r:5:0:stream;",
                expect: ExpressionValue::Resource {
                    id: "5".into(),
                    value: "stream".into(),
                },
            },
            TestCase {
                raw: "i:7",
                expect: ExpressionValue::Int("7".into()),
            },
        ];

        for tc in test_cases {
            assert_eq!(decode_str(tc.raw).unwrap(), tc.expect, "{}", tc.raw);
        }
    }

    #[test]
    fn test_declared_len_without_members() {
        struct TestCase {
            raw: &'static str,
            declared_len: usize,
        }
        let test_cases = [
            TestCase {
                raw: "a:3:{}",
                declared_len: 3,
            },
            TestCase {
                raw: "a:3:}",
                declared_len: 3,
            },
            TestCase {
                raw: "a:10:",
                declared_len: 10,
            },
            TestCase {
                raw: "a:0:{}",
                declared_len: 0,
            },
            TestCase {
                raw: r#"O:3:"Foo":4:{}"#,
                declared_len: 4,
            },
        ];

        for tc in test_cases {
            let value = decode_str(tc.raw).unwrap();
            assert_eq!(value.declared_len(), tc.declared_len, "{}", tc.raw);
            assert!(value.children().is_empty(), "{}", tc.raw);
        }
    }

    #[test]
    fn test_decode_object() {
        let value =
            decode_str(r#"O:8:"stdClass":2:{s:4:"name";s:2:"zf";s:4:"list";a:1:{i:0;N;}}"#).unwrap();
        let ExpressionValue::Object {
            class_name,
            declared_len,
            children,
        } = &value
        else {
            panic!("object expected");
        };
        assert_eq!(class_name, "stdClass");
        assert_eq!(*declared_len, 2);
        assert_eq!(children[0].expression.name(), "name");
        assert_eq!(children[0].value, ExpressionValue::String("zf".into()));
        assert_eq!(children[1].value.declared_len(), 1);
        assert_eq!(children[1].value.children()[0].value, ExpressionValue::Null);
    }

    #[test]
    fn test_decode_with_context() {
        let ctx = Expression::variables();
        let raw = br#"a:2:{s:4:"this";O:3:"Foo":1:{s:1:"x";i:1;}s:1:"a";a:1:{s:1:"k";b:0;}}"#;
        let value = decode(raw, TransferEncoding::Utf8, Some(&ctx)).unwrap();

        let this = &value.children()[0];
        assert_eq!(this.expression.text(), "$this");
        assert_eq!(this.expression.kind(), ExpressionKind::This);
        let x = &this.value.children()[0];
        assert_eq!(x.expression.text(), "$this->x");
        assert_eq!(x.expression.chain(), &["$this".to_string(), "x".to_string()]);

        let a = &value.children()[1];
        assert_eq!(a.expression.kind(), ExpressionKind::Local);
        assert_eq!(a.value.children()[0].expression.text(), "$a['k']");
    }

    #[test]
    fn test_decode_latin1() {
        let value = decode(b"s:3:\"caf\xE9\";", TransferEncoding::Latin1, None);
        assert!(matches!(value, Err(DecodeError::UnexpectedEnd(_)) | Err(DecodeError::Expected { .. })));

        let value = decode(b"s:4:\"caf\xE9\";", TransferEncoding::Latin1, None).unwrap();
        assert_eq!(value, ExpressionValue::String("café".into()));
    }

    #[test]
    fn test_malformed() {
        struct TestCase {
            raw: String,
            expect: DecodeError,
        }
        let too_deep = "a:1:{i:0;".repeat(MAX_DEPTH + 1) + "N;" + &"}".repeat(MAX_DEPTH + 1);
        let test_cases = [
            TestCase {
                raw: "a:1:{d:1.5;i:1;}".into(),
                expect: DecodeError::InvalidKey { tag: 'd', pos: 5 },
            },
            TestCase {
                raw: "x:1;".into(),
                expect: DecodeError::UnknownType { tag: 'x', pos: 0 },
            },
            TestCase {
                raw: "a:z:{}".into(),
                expect: DecodeError::InvalidNumber {
                    token: "z".into(),
                    pos: 2,
                },
            },
            TestCase {
                raw: r#"s:10:"abc";"#.into(),
                expect: DecodeError::UnexpectedEnd(11),
            },
            TestCase {
                raw: "a:2:{i:0;i:5;".into(),
                expect: DecodeError::UnexpectedEnd(13),
            },
            TestCase {
                raw: "a:1:[".into(),
                expect: DecodeError::Expected { expect: '{', pos: 4 },
            },
            TestCase {
                raw: too_deep,
                expect: DecodeError::TooDeep { pos: MAX_DEPTH * 9 },
            },
        ];

        for tc in test_cases {
            assert_eq!(decode_str(&tc.raw).unwrap_err(), tc.expect, "{}", tc.raw);
        }
    }
}
