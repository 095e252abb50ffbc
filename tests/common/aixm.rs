// Gemeinsame AIXM-Testnachrichten fuer Integrationstests.
//
// Wird per `include!` eingebunden.

const AIRSPACE_ID: &str = "0a1b2c3d-0000-4000-8000-00000000000a";
const ORGANISATION_ID: &str = "0a1b2c3d-0000-4000-8000-00000000000b";
const UNIT_ID: &str = "0a1b2c3d-0000-4000-8000-00000000000c";
const FOREIGN_ID: &str = "0a1b2c3d-0000-4000-8000-0000000000ff";

/// Nachricht mit Metadaten und drei Features:
/// - Airspace mit zwei Time Slices (1/0 und 2/1), Platzhalter-Annotation und Extension
/// - OrganisationAuthority mit nicht-konventionellem gml:id `ORG_1`
/// - Unit mit Referenzen auf Airspace, `#ORG_1` und ein unbekanntes Feature
fn sample_message() -> String {
    format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<message:AIXMBasicMessage xmlns:message="http://www.aixm.aero/schema/5.1/message"
    xmlns:aixm="http://www.aixm.aero/schema/5.1"
    xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    gml:id="M1">
  <aixm:messageMetadata>
    <gml:identifier codeSpace="urn:uuid:">metadata-only-marker</gml:identifier>
  </aixm:messageMetadata>
  <message:hasMember>
    <aixm:Airspace gml:id="uuid.{AIRSPACE_ID}">
      <gml:identifier codeSpace="urn:uuid:">{AIRSPACE_ID}</gml:identifier>
      <aixm:timeSlice>
        <aixm:AirspaceTimeSlice gml:id="ASE_TS_OLD">
          <gml:validTime>
            <gml:TimePeriod gml:id="TP_OLD">
              <gml:beginPosition>2019-01-01T00:00:00Z</gml:beginPosition>
              <gml:endPosition indeterminatePosition="unknown"/>
            </gml:TimePeriod>
          </gml:validTime>
          <aixm:interpretation>BASELINE</aixm:interpretation>
          <aixm:sequenceNumber>1</aixm:sequenceNumber>
          <aixm:correctionNumber>0</aixm:correctionNumber>
          <aixm:designator>OLD-REVISION</aixm:designator>
        </aixm:AirspaceTimeSlice>
      </aixm:timeSlice>
      <aixm:timeSlice>
        <aixm:AirspaceTimeSlice gml:id="ASE_TS_NEW">
          <gml:validTime>
            <gml:TimePeriod gml:id="TP_NEW">
              <gml:beginPosition>2020-06-01T00:00:00Z</gml:beginPosition>
              <gml:endPosition indeterminatePosition="unknown"/>
            </gml:TimePeriod>
          </gml:validTime>
          <aixm:interpretation>BASELINE</aixm:interpretation>
          <aixm:sequenceNumber>2</aixm:sequenceNumber>
          <aixm:correctionNumber>1</aixm:correctionNumber>
          <aixm:designator>NEW-REVISION</aixm:designator>
          <aixm:annotation xsi:nil="true"/>
          <aixm:extension>ext</aixm:extension>
        </aixm:AirspaceTimeSlice>
      </aixm:timeSlice>
    </aixm:Airspace>
  </message:hasMember>
  <message:hasMember>
    <aixm:OrganisationAuthority gml:id="ORG_1">
      <gml:identifier codeSpace="urn:uuid:">{ORGANISATION_ID}</gml:identifier>
      <aixm:timeSlice>
        <aixm:OrganisationAuthorityTimeSlice gml:id="OA_TS">
          <gml:validTime>
            <gml:TimePeriod gml:id="OA_TP">
              <gml:beginPosition>2018-01-01T00:00:00Z</gml:beginPosition>
            </gml:TimePeriod>
          </gml:validTime>
          <aixm:interpretation>BASELINE</aixm:interpretation>
          <aixm:sequenceNumber>3</aixm:sequenceNumber>
          <aixm:correctionNumber>2</aixm:correctionNumber>
          <aixm:name>AUTHORITY &amp; CO</aixm:name>
        </aixm:OrganisationAuthorityTimeSlice>
      </aixm:timeSlice>
    </aixm:OrganisationAuthority>
  </message:hasMember>
  <message:hasMember>
    <aixm:Unit gml:id="uuid.{UNIT_ID}">
      <gml:identifier codeSpace="urn:uuid:">{UNIT_ID}</gml:identifier>
      <aixm:timeSlice>
        <aixm:UnitTimeSlice gml:id="UNIT_TS">
          <gml:validTime>
            <gml:TimePeriod gml:id="UNIT_TP">
              <gml:beginPosition>2018-01-01T00:00:00Z</gml:beginPosition>
            </gml:TimePeriod>
          </gml:validTime>
          <aixm:interpretation>BASELINE</aixm:interpretation>
          <aixm:sequenceNumber>1</aixm:sequenceNumber>
          <aixm:correctionNumber>0</aixm:correctionNumber>
          <aixm:ownerOrganisation xlink:href="#ORG_1"/>
          <aixm:airspace xlink:href="urn:uuid:{AIRSPACE_ID}"/>
          <aixm:foreign xlink:href="urn:uuid:{FOREIGN_ID}"/>
          <aixm:both xlink:href="#uuid.{AIRSPACE_ID} and uuid.{FOREIGN_ID}"/>
        </aixm:UnitTimeSlice>
      </aixm:timeSlice>
    </aixm:Unit>
  </message:hasMember>
</message:AIXMBasicMessage>
"##
    )
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
