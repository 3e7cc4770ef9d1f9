//! Wire codecs: XML request templating and namespace-stripped parsing,
//! the ABAP `values/DATA/<NAME>` envelope, base64 helpers and line-ending
//! canonicalization.

mod private
{
  use crate::error::{ Error, Result };
  use quick_xml::events::Event;
  use quick_xml::reader::Reader;

  /// Escape the five XML special characters for use inside an attribute
  /// value or text node.
  #[ must_use ]
  pub fn escape_xml( s : &str ) -> String
  {
    let mut out = String::with_capacity( s.len() );
    for c in s.chars()
    {
      match c
      {
        '&' => out.push_str( "&amp;" ),
        '<' => out.push_str( "&lt;" ),
        '>' => out.push_str( "&gt;" ),
        '"' => out.push_str( "&quot;" ),
        '\'' => out.push_str( "&apos;" ),
        _ => out.push( c ),
      }
    }
    out
  }

  /// Strip a known ADT namespace prefix (`tm:`, `chkrun:`, `aunit:`,
  /// `adtcore:`, `asx:`) from a qualified XML element or attribute name.
  #[ must_use ]
  pub fn strip_namespace_prefix( name : &str ) -> &str
  {
    const PREFIXES : &[ &str ] = &[ "tm:", "chkrun:", "aunit:", "adtcore:", "asx:" ];
    for prefix in PREFIXES
    {
      if let Some( rest ) = name.strip_prefix( prefix )
      {
        return rest;
      }
    }
    name
  }

  /// One flattened XML element: its (prefix-stripped) local name, text
  /// content, and prefix-stripped attributes, in document order.
  #[ derive( Debug, Clone, PartialEq, Eq, Default ) ]
  pub struct XmlElement
  {
    /// The local element name, namespace prefix removed.
    pub name : String,
    /// Text content directly inside the element.
    pub text : String,
    /// Attributes, as `(local name, value)` pairs in document order.
    pub attributes : Vec< ( String, String ) >,
  }

  /// Parse an ADT XML response into a flat list of elements in document
  /// order, with namespace prefixes stripped from element and attribute
  /// names. Flat (non-nested) representation is sufficient for every ADT
  /// response this engine consumes: activation results, syntax check
  /// findings, transport lists and discovery documents are all shallow.
  ///
  /// # Errors
  /// Returns [`Error::Validation`] on malformed XML.
  pub fn parse_elements( xml : &str ) -> Result< Vec< XmlElement > >
  {
    let mut reader = Reader::from_str( xml );
    reader.config_mut().trim_text( true );

    let mut elements = Vec::new();
    let mut current : Option< XmlElement > = None;
    let mut buf = Vec::new();

    loop
    {
      match reader.read_event_into( &mut buf )?
      {
        Event::Eof => break,
        Event::Start( e ) | Event::Empty( e ) =>
        {
          let raw_name = String::from_utf8_lossy( e.name().as_ref() ).to_string();
          let name = strip_namespace_prefix( &raw_name ).to_string();
          let mut attributes = Vec::new();
          for attr in e.attributes().flatten()
          {
            let raw_key = String::from_utf8_lossy( attr.key.as_ref() ).to_string();
            let key = strip_namespace_prefix( &raw_key ).to_string();
            let value = attr.unescape_value().unwrap_or_default().to_string();
            attributes.push( ( key, value ) );
          }
          let element = XmlElement { name, text : String::new(), attributes };
          elements.push( element.clone() );
          current = Some( element );
        },
        Event::Text( t ) =>
        {
          if let Some( cur ) = current.as_mut()
          {
            cur.text.push_str( &t.unescape().unwrap_or_default() );
            if let Some( last ) = elements.last_mut()
            {
              last.text.clone_from( &cur.text );
            }
          }
        },
        Event::End( _ ) =>
        {
          current = None;
        },
        _ => {},
      }
      buf.clear();
    }

    Ok( elements )
  }

  /// Build the `<?xml version="1.0" encoding="UTF-8"?>` prologue followed
  /// by a single root element with the given attributes, used by every
  /// lock/activate/transport request body this engine sends.
  #[ must_use ]
  pub fn xml_request( root : &str, attributes : &[ ( &str, &str ) ] ) -> String
  {
    let attrs : String = attributes
      .iter()
      .map( | ( k, v ) | format!( " {k}=\"{}\"", escape_xml( v ) ) )
      .collect();
    format!( "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{root}{attrs}/>" )
  }

  /// Build the `<?xml version="1.0" encoding="UTF-8"?>` prologue followed
  /// by a root element carrying its own attributes plus an ordered list of
  /// child elements (each with their own attributes), used by creation
  /// descriptors whose `packageRef`/`containerRef` the spec describes as a
  /// nested child rather than a flat attribute.
  #[ must_use ]
  pub fn xml_request_nested(
    root : &str,
    root_attributes : &[ ( &str, &str ) ],
    children : &[ ( &str, &[ ( &str, &str ) ] ) ],
  ) -> String
  {
    let root_attrs : String = root_attributes
      .iter()
      .map( | ( k, v ) | format!( " {k}=\"{}\"", escape_xml( v ) ) )
      .collect();
    let child_xml : String = children
      .iter()
      .map( | ( tag, attrs ) |
      {
        let attrs : String = attrs.iter().map( | ( k, v ) | format!( " {k}=\"{}\"", escape_xml( v ) ) ).collect();
        format!( "\n  <{tag}{attrs}/>" )
      } )
      .collect();
    format!( "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{root}{root_attrs}>{child_xml}\n</{root}>" )
  }

  /// Decode the `values/DATA/<NAME>` envelope ADT wraps free-SQL and
  /// quick-search style JSON/XML payloads in, returning the inner value
  /// named `name`.
  ///
  /// # Errors
  /// Returns [`Error::Validation`] if the envelope or the named value is absent.
  pub fn decode_values_envelope( elements : &[ XmlElement ], name : &str ) -> Result< String >
  {
    elements
      .iter()
      .find( | e | e.name == "DATA" && e.attributes.iter().any( | ( k, v ) | k == "name" && v == name ) )
      .map( | e | e.text.clone() )
      .ok_or_else( || Error::Validation( format!( "values envelope missing DATA[name={name}]" ) ) )
  }

  /// Base64-encode bytes (RFC 4648 standard alphabet, with padding), used
  /// for binary source uploads and the WebSocket pre-handshake auth header.
  #[ must_use ]
  pub fn base64_encode( bytes : &[ u8 ] ) -> String
  {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode( bytes )
  }

  /// Decode standard-alphabet base64 back to bytes.
  ///
  /// # Errors
  /// Returns [`Error::Validation`] on malformed base64.
  pub fn base64_decode( s : &str ) -> Result< Vec< u8 > >
  {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode( s )
      .map_err( | e | Error::Validation( format!( "invalid base64: {e}" ) ) )
  }

  /// The line-ending convention detected in a source text.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum LineEnding
  {
    /// `\n` only.
    Lf,
    /// `\r\n`.
    CrLf,
  }

  impl LineEnding
  {
    /// Detect the dominant line ending in `text`; defaults to LF for text
    /// with no line breaks.
    #[ must_use ]
    pub fn detect( text : &str ) -> Self
    {
      if text.contains( "\r\n" ) { LineEnding::CrLf } else { LineEnding::Lf }
    }

    /// The literal ending string.
    #[ must_use ]
    pub fn as_str( self ) -> &'static str
    {
      match self { LineEnding::Lf => "\n", LineEnding::CrLf => "\r\n" }
    }
  }

  /// Canonicalize `text` to LF-only for in-memory editing, remembering the
  /// original convention so [`restore_line_ending`] can write it back
  /// unchanged (spec invariant: round-tripping an unmodified source is
  /// byte-identical).
  #[ must_use ]
  pub fn canonicalize_line_endings( text : &str ) -> ( String, LineEnding )
  {
    let ending = LineEnding::detect( text );
    ( text.replace( "\r\n", "\n" ), ending )
  }

  /// Reapply a previously-detected line ending convention to LF-canonical text.
  #[ must_use ]
  pub fn restore_line_ending( text : &str, ending : LineEnding ) -> String
  {
    match ending
    {
      LineEnding::Lf => text.to_string(),
      LineEnding::CrLf => text.replace( '\n', "\r\n" ),
    }
  }
}

pub use private::{
  escape_xml, strip_namespace_prefix, parse_elements, xml_request, xml_request_nested, decode_values_envelope,
  base64_encode, base64_decode, LineEnding, canonicalize_line_endings, restore_line_ending,
  XmlElement,
};

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn escapes_all_five_special_characters()
  {
    assert_eq!( escape_xml( "<a>&\"'b'\"" ), "&lt;a&gt;&amp;&quot;&apos;b&apos;&quot;" );
  }

  #[ test ]
  fn strips_known_namespace_prefixes()
  {
    assert_eq!( strip_namespace_prefix( "adtcore:name" ), "name" );
    assert_eq!( strip_namespace_prefix( "tm:number" ), "number" );
    assert_eq!( strip_namespace_prefix( "unqualified" ), "unqualified" );
  }

  #[ test ]
  fn parses_flat_elements_with_attributes()
  {
    let xml = r#"<root><item adtcore:name="ZFOO" tm:number="1"/></root>"#;
    let elements = parse_elements( xml ).unwrap();
    let item = elements.iter().find( | e | e.name == "item" ).unwrap();
    assert!( item.attributes.contains( &( "name".to_string(), "ZFOO".to_string() ) ) );
    assert!( item.attributes.contains( &( "number".to_string(), "1".to_string() ) ) );
  }

  #[ test ]
  fn xml_request_escapes_attribute_values()
  {
    let body = xml_request( "tm:root", &[ ( "tm:targettransport", "A&B" ) ] );
    assert!( body.contains( "A&amp;B" ) );
    assert!( body.starts_with( "<?xml version=\"1.0\"" ) );
  }

  #[ test ]
  fn xml_request_nested_embeds_child_elements()
  {
    let body = xml_request_nested(
      "adtcore:objectStructure",
      &[ ( "adtcore:name", "ZCL_FOO" ), ( "adtcore:type", "CLAS" ) ],
      &[ ( "packageRef", &[ ( "adtcore:name", "$TMP" ) ] ) ],
    );
    assert!( body.contains( "adtcore:name=\"ZCL_FOO\"" ) );
    assert!( body.contains( "<packageRef adtcore:name=\"$TMP\"/>" ) );
    assert!( body.ends_with( "</adtcore:objectStructure>" ) );
  }

  #[ test ]
  fn values_envelope_finds_named_data_by_text()
  {
    let elements = vec![
      XmlElement { name : "DATA".to_string(), text : "hello".to_string(),
        attributes : vec![ ( "name".to_string(), "RESULT".to_string() ) ] },
    ];
    assert_eq!( decode_values_envelope( &elements, "RESULT" ).unwrap(), "hello" );
    assert!( decode_values_envelope( &elements, "OTHER" ).is_err() );
  }

  #[ test ]
  fn base64_round_trips()
  {
    let encoded = base64_encode( b"hello world" );
    assert_eq!( base64_decode( &encoded ).unwrap(), b"hello world" );
  }

  #[ test ]
  fn line_ending_round_trips_crlf()
  {
    let original = "line1\r\nline2\r\n";
    let ( canonical, ending ) = canonicalize_line_endings( original );
    assert_eq!( canonical, "line1\nline2\n" );
    assert_eq!( ending, LineEnding::CrLf );
    assert_eq!( restore_line_ending( &canonical, ending ), original );
  }

  #[ test ]
  fn line_ending_round_trips_lf()
  {
    let original = "line1\nline2\n";
    let ( canonical, ending ) = canonicalize_line_endings( original );
    assert_eq!( ending, LineEnding::Lf );
    assert_eq!( restore_line_ending( &canonical, ending ), original );
  }
}
